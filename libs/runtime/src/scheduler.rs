//! Scheduler contract and cross-scheduler registry
//!
//! [`MessageScheduler`] is the surface every processor depends on;
//! [`SchedulerRegistry`] is the narrow collaborator used only to locate
//! which scheduler owns a processor during cross-scheduler sends.
//! [`LocalRegistry`] is the concrete registry built at startup — an
//! explicit object handed to every scheduler, never a process-wide
//! singleton.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;

use crate::message::Message;
use crate::processor::MessageProcessor;
use types::ProcessorId;

/// Protocol-usage errors returned to scheduler callers. All of these are
/// recoverable by the caller; invariant violations panic instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("processor {id} is already registered with this scheduler")]
    AlreadyRegistered { id: ProcessorId },

    #[error("no scheduler knows message processor {id}")]
    UnknownMessageProcessor { id: ProcessorId },

    #[error("processor {id} is not owned by this scheduler")]
    NotResponsible { id: ProcessorId },

    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Opaque handle identifying one pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    pub(crate) fn new(raw: u64) -> Self {
        TimerToken(raw)
    }

    pub(crate) fn raw(&self) -> u64 {
        self.0
    }
}

/// Contract every scheduler implementation exposes to processors.
pub trait MessageScheduler: Send + Sync {
    fn name(&self) -> &str;

    /// Stages `processor` for registration with a fresh queue. Fails with
    /// [`SchedulerError::AlreadyRegistered`] if it is already live (and not
    /// pending removal) or already staged.
    fn register_message_processor(
        &self,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), SchedulerError>;

    /// Stages removal of a processor. Removal of a still-staged
    /// registration takes effect immediately; removal of a live processor
    /// happens opportunistically on a worker thread.
    fn unregister_message_processor(&self, id: ProcessorId) -> Result<(), SchedulerError>;

    /// Routes a message: live destination → its queue; staged destination →
    /// the staged queue; foreign destination → the owning scheduler's
    /// [`pass_message`](Self::pass_message); otherwise
    /// [`SchedulerError::UnknownMessageProcessor`].
    fn send_message(&self, msg: Message) -> Result<(), SchedulerError>;

    /// Schedules a one-shot delayed self-delivery of a Timer message.
    /// Canceling before the deadline guarantees non-delivery.
    fn set_timer(&self, delay: Duration, msg: Message) -> Result<TimerToken, SchedulerError>;

    /// Cancels a pending timer. A no-op after the timer fired.
    fn cancel_timer(&self, token: TimerToken);

    /// Opens the global run gate; workers start draining queues.
    fn run(&self);

    /// Closes the run gate. Workers mid-dispatch finish their current
    /// message first.
    fn stop(&self);

    /// Whether this scheduler owns `id`, live or staged.
    fn has_message_processor(&self, id: ProcessorId) -> bool;

    /// Accepts a message handed over by another scheduler. Fails with
    /// [`SchedulerError::NotResponsible`] unless this scheduler owns
    /// `msg.to`.
    fn pass_message(&self, msg: Message) -> Result<(), SchedulerError>;
}

/// Locates the scheduler owning a processor. Consulted (and memoized) by
/// schedulers when a destination or sender is not local.
pub trait SchedulerRegistry: Send + Sync {
    fn lookup_scheduler(&self, id: ProcessorId) -> Option<Arc<dyn MessageScheduler>>;
}

/// Registry over the schedulers of one process. Holds weak handles so the
/// registry never keeps a scheduler alive.
#[derive(Default)]
pub struct LocalRegistry {
    schedulers: RwLock<Vec<Weak<dyn MessageScheduler>>>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scheduler(&self, scheduler: &Arc<dyn MessageScheduler>) {
        self.schedulers.write().push(Arc::downgrade(scheduler));
    }
}

impl SchedulerRegistry for LocalRegistry {
    fn lookup_scheduler(&self, id: ProcessorId) -> Option<Arc<dyn MessageScheduler>> {
        let schedulers = self.schedulers.read();
        schedulers
            .iter()
            .filter_map(Weak::upgrade)
            .find(|s| s.has_message_processor(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CaptureScheduler, RecordingProcessor};

    #[test]
    fn registry_finds_the_owning_scheduler() {
        let registry = LocalRegistry::new();
        let s1: Arc<dyn MessageScheduler> = Arc::new(CaptureScheduler::new("s1"));
        let s2: Arc<dyn MessageScheduler> = Arc::new(CaptureScheduler::new("s2"));
        registry.add_scheduler(&s1);
        registry.add_scheduler(&s2);

        let p = RecordingProcessor::new("p", &s2);
        s2.register_message_processor(p.clone()).unwrap();

        let found = registry.lookup_scheduler(p.id()).unwrap();
        assert_eq!(found.name(), "s2");
        assert!(registry.lookup_scheduler(ProcessorId::next()).is_none());
    }

    #[test]
    fn registry_drops_dead_schedulers() {
        let registry = LocalRegistry::new();
        let p_id;
        {
            let s: Arc<dyn MessageScheduler> = Arc::new(CaptureScheduler::new("gone"));
            registry.add_scheduler(&s);
            let p = RecordingProcessor::new("p", &s);
            s.register_message_processor(p.clone()).unwrap();
            p_id = p.id();
        }
        assert!(registry.lookup_scheduler(p_id).is_none());
    }
}
