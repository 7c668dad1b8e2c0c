//! Shared test fixtures
//!
//! Used by this crate's tests and by downstream crates exercising blocks
//! and pipelines: a scheduler that records instead of dispatching, and a
//! processor that records instead of processing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::message::{Message, MessageKind};
use crate::processor::{MessageProcessor, ProcessorBase, ProcessorError};
use crate::scheduler::{MessageScheduler, SchedulerError, TimerToken};
use types::ProcessorId;

/// Scheduler double that records every send for later inspection and never
/// dispatches anything.
pub struct CaptureScheduler {
    name: String,
    registered: Mutex<HashSet<ProcessorId>>,
    sent: Mutex<Vec<Message>>,
    timers: Mutex<Vec<(Duration, Message)>>,
    next_token: AtomicU64,
}

impl CaptureScheduler {
    pub fn new(name: impl Into<String>) -> Self {
        CaptureScheduler {
            name: name.into(),
            registered: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
            timers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Takes everything sent so far, clearing the record.
    pub fn take_sent(&self) -> Vec<Message> {
        std::mem::take(&mut self.sent.lock())
    }

    pub fn take_timers(&self) -> Vec<(Duration, Message)> {
        std::mem::take(&mut self.timers.lock())
    }
}

impl MessageScheduler for CaptureScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_message_processor(
        &self,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), SchedulerError> {
        let id = processor.id();
        if !self.registered.lock().insert(id) {
            return Err(SchedulerError::AlreadyRegistered { id });
        }
        Ok(())
    }

    fn unregister_message_processor(&self, id: ProcessorId) -> Result<(), SchedulerError> {
        if !self.registered.lock().remove(&id) {
            return Err(SchedulerError::UnknownMessageProcessor { id });
        }
        Ok(())
    }

    fn send_message(&self, msg: Message) -> Result<(), SchedulerError> {
        self.sent.lock().push(msg);
        Ok(())
    }

    fn set_timer(&self, delay: Duration, msg: Message) -> Result<TimerToken, SchedulerError> {
        self.timers.lock().push((delay, msg));
        Ok(TimerToken::new(self.next_token.fetch_add(1, Ordering::Relaxed)))
    }

    fn cancel_timer(&self, _token: TimerToken) {}

    fn run(&self) {}

    fn stop(&self) {}

    fn has_message_processor(&self, id: ProcessorId) -> bool {
        self.registered.lock().contains(&id)
    }

    fn pass_message(&self, msg: Message) -> Result<(), SchedulerError> {
        let to = msg.to();
        if !self.has_message_processor(to) {
            return Err(SchedulerError::NotResponsible { id: to });
        }
        self.send_message(msg)
    }
}

/// Compact record of one delivered message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub kind: MessageKind,
    pub from: ProcessorId,
    pub payload: Vec<u8>,
    pub event_id: Option<String>,
}

/// Processor double that accepts every message kind and records it.
pub struct RecordingProcessor {
    base: ProcessorBase,
    label: String,
    deliveries: Mutex<Vec<Delivery>>,
    busy: AtomicBool,
    overlapped: AtomicBool,
    hold: Option<Duration>,
    threadsafe: bool,
}

impl RecordingProcessor {
    pub fn new(label: impl Into<String>, scheduler: &Arc<dyn MessageScheduler>) -> Arc<Self> {
        Arc::new(RecordingProcessor {
            base: ProcessorBase::new(scheduler),
            label: label.into(),
            deliveries: Mutex::new(Vec::new()),
            busy: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
            hold: None,
            threadsafe: false,
        })
    }

    /// Variant that sleeps inside dispatch, for exercising the scheduler's
    /// mutual-exclusion and parallelism behavior.
    pub fn slow(
        label: impl Into<String>,
        scheduler: &Arc<dyn MessageScheduler>,
        hold: Duration,
        threadsafe: bool,
    ) -> Arc<Self> {
        Arc::new(RecordingProcessor {
            base: ProcessorBase::new(scheduler),
            label: label.into(),
            deliveries: Mutex::new(Vec::new()),
            busy: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
            hold: Some(hold),
            threadsafe,
        })
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Polls until `count` messages arrived or `timeout` elapsed.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.delivery_count() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.delivery_count() >= count
    }

    /// Whether two dispatches ever overlapped in time.
    pub fn overlap_detected(&self) -> bool {
        self.overlapped.load(Ordering::Acquire)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl MessageProcessor for RecordingProcessor {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn class_name(&self) -> &'static str {
        "RecordingProcessor"
    }

    fn is_threadsafe(&self) -> bool {
        self.threadsafe
    }

    fn process_message(&self, msg: Message) -> Result<(), ProcessorError> {
        if self.busy.swap(true, Ordering::AcqRel) {
            self.overlapped.store(true, Ordering::Release);
        }
        if let Some(hold) = self.hold {
            std::thread::sleep(hold);
        }
        self.deliveries.lock().push(Delivery {
            kind: msg.kind(),
            from: msg.from(),
            payload: msg.payload().to_vec(),
            event_id: msg.event_id().map(str::to_owned),
        });
        self.busy.store(false, Ordering::Release);
        Ok(())
    }
}
