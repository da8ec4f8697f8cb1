//! One-to-many event feed over `tokio::sync::broadcast`.
//!
//! Sending never blocks. With no subscriber the event is dropped; a
//! subscriber that falls more than `capacity` events behind observes
//! `RecvError::Lagged` and skips ahead.

use tokio::sync::broadcast;

/// Event feed
#[derive(Debug)]
pub struct Feed<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> Feed<T> {
    /// Create a feed buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events sent from now on
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of subscribers that will see it.
    pub fn send(&self, event: T) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
