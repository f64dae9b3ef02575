// src/bus/publisher.rs
// Sending half of an in-process topic.

use std::sync::mpsc;

use super::BusError;

/// Typed publisher bound to one topic.
#[derive(Debug)]
pub struct Publisher<T> {
    topic: String,
    inner: mpsc::Sender<T>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Publisher {
            topic: self.topic.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T> Publisher<T> {
    pub(super) fn new(topic: &str, inner: mpsc::Sender<T>) -> Self {
        Publisher {
            topic: topic.to_string(),
            inner,
        }
    }

    /// Topic this publisher writes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    // Fails only once every subscriber is gone
    /// Sends `message`. Fails once every subscriber is gone.
    pub fn publish(&self, message: T) -> Result<(), BusError> {
        self.inner
            .send(message)
            .map_err(|_| BusError::Disconnected(self.topic.clone()))
    }
}
