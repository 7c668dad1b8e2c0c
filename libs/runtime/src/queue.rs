//! Per-processor message queues
//!
//! One FIFO per registered processor, unbounded, internally locked so two
//! workers can safely touch two different queues concurrently.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::message::Message;

#[derive(Debug, Default)]
pub struct SyncMessageQueue {
    inner: Mutex<VecDeque<Message>>,
}

impl SyncMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, msg: Message) {
        self.inner.lock().push_back(msg);
    }

    pub fn pop(&self) -> Option<Message> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Empties the queue, returning whatever was still pending. Used when a
    /// processor is unregistered.
    pub fn drain(&self) -> Vec<Message> {
        self.inner.lock().drain(..).collect()
    }
}
