// src/bus/subscriber.rs
// Receiving half of an in-process topic. One consumer per topic, so whoever owns the
// subscriber is the single writer for whatever it drives.

use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use super::BusError;

/// Typed subscriber bound to one topic.
#[derive(Debug)]
pub struct Subscriber<T> {
    topic: String,
    inner: mpsc::Receiver<T>,
}

impl<T> Subscriber<T> {
    pub(super) fn new(topic: &str, inner: mpsc::Receiver<T>) -> Self {
        Subscriber {
            topic: topic.to_string(),
            inner,
        }
    }

    /// Topic this subscriber reads from.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits up to `timeout` for the next message.
    /// `Ok(None)` means nothing arrived; `Err` means every publisher is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>, BusError> {
        match self.inner.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BusError::Disconnected(self.topic.clone())),
        }
    }

    /// Next queued message without blocking.
    pub fn try_recv(&self) -> Result<Option<T>, BusError> {
        match self.inner.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(BusError::Disconnected(self.topic.clone())),
        }
    }

    /// Drains the queue and returns the newest message, if any.
    pub fn latest(&self) -> Option<T> {
        self.inner.try_iter().last()
    }
}
