//! The message-processor contract
//!
//! Anything that sends or receives messages — building blocks, connectors,
//! adapters, multiplexers — implements [`MessageProcessor`] and embeds a
//! [`ProcessorBase`] carrying the shared state: identity, the scheduler
//! binding, the `prev`/`next` pipeline links, and the event-listener
//! registry.
//!
//! Dispatch is purely kind-based: `process_message` fans out to one of the
//! four hooks, and any hook a concrete processor does not override reports
//! [`ProcessorError::Unhandled`]. The scheduler catches that at its
//! dispatch point, logs it, and drops the message.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::message::{Message, MessageKind};
use crate::scheduler::{MessageScheduler, SchedulerError};
use types::{hash_uri, IdHash, ProcessorId};

/// Errors a processor's dispatch hooks can raise. All of these are caught
/// and logged where the scheduler invokes `process_message`; the message is
/// dropped and the sender is never notified automatically.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The processor has no handler for this message kind.
    #[error("{processor} cannot handle {kind:?} messages")]
    Unhandled {
        kind: MessageKind,
        processor: String,
    },

    /// A protocol-semantic failure, e.g. a checksum mismatch.
    #[error("{detail}")]
    Protocol { detail: String },

    /// The payload was too short or malformed for the decode the processor
    /// attempted.
    #[error(transparent)]
    Buffer(#[from] codec::BufferError),

    /// A re-entrant send from inside a dispatch hook failed.
    #[error(transparent)]
    Send(#[from] SchedulerError),
}

#[derive(Debug, Default, Clone, Copy)]
struct Links {
    prev: Option<ProcessorId>,
    next: Option<ProcessorId>,
}

/// State shared by every processor implementation.
pub struct ProcessorBase {
    id: ProcessorId,
    component_uri: Option<String>,
    component_hash: IdHash,
    scheduler: Weak<dyn MessageScheduler>,
    links: Mutex<Links>,
    listeners: Mutex<HashMap<String, Vec<ProcessorId>>>,
}

impl ProcessorBase {
    pub fn new(scheduler: &Arc<dyn MessageScheduler>) -> Self {
        ProcessorBase {
            id: ProcessorId::next(),
            component_uri: None,
            component_hash: 0,
            scheduler: Arc::downgrade(scheduler),
            links: Mutex::new(Links::default()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// A base carrying a URI-style component id, hashed for fast
    /// comparison.
    pub fn with_component_uri(
        scheduler: &Arc<dyn MessageScheduler>,
        uri: impl Into<String>,
    ) -> Self {
        let uri = uri.into();
        let component_hash = hash_uri(&uri);
        ProcessorBase {
            component_uri: Some(uri),
            component_hash,
            ..Self::new(scheduler)
        }
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    pub fn component_uri(&self) -> Option<&str> {
        self.component_uri.as_deref()
    }

    pub fn component_hash(&self) -> IdHash {
        self.component_hash
    }

    /// The bound scheduler. A processor outliving its scheduler is a
    /// lifecycle defect, so this panics instead of returning an error.
    pub fn scheduler(&self) -> Arc<dyn MessageScheduler> {
        match self.scheduler.upgrade() {
            Some(scheduler) => scheduler,
            None => panic!("scheduler dropped while processor {} is alive", self.id),
        }
    }

    pub fn prev(&self) -> Option<ProcessorId> {
        self.links.lock().prev
    }

    pub fn next(&self) -> Option<ProcessorId> {
        self.links.lock().next
    }

    pub fn set_prev(&self, prev: Option<ProcessorId>) {
        self.links.lock().prev = prev;
    }

    pub fn set_next(&self, next: Option<ProcessorId>) {
        self.links.lock().next = next;
    }
}

pub trait MessageProcessor: Send + Sync {
    /// Access to the embedded shared state.
    fn base(&self) -> &ProcessorBase;

    /// Concrete type name, the identity fallback when no component URI is
    /// set.
    fn class_name(&self) -> &'static str;

    /// Whether `process_message` may be invoked concurrently. Defaults to
    /// false; the scheduler then serializes dispatch per processor.
    fn is_threadsafe(&self) -> bool {
        false
    }

    fn process_event(&self, msg: Message) -> Result<(), ProcessorError> {
        Err(ProcessorError::Unhandled {
            kind: msg.kind(),
            processor: self.name(),
        })
    }

    fn process_timer(&self, msg: Message) -> Result<(), ProcessorError> {
        Err(ProcessorError::Unhandled {
            kind: msg.kind(),
            processor: self.name(),
        })
    }

    fn process_outgoing(&self, msg: Message) -> Result<(), ProcessorError> {
        Err(ProcessorError::Unhandled {
            kind: msg.kind(),
            processor: self.name(),
        })
    }

    fn process_incoming(&self, msg: Message) -> Result<(), ProcessorError> {
        Err(ProcessorError::Unhandled {
            kind: msg.kind(),
            processor: self.name(),
        })
    }

    /// Kind-based dispatch to the four hooks. Generic messages have no
    /// handler by design.
    fn process_message(&self, msg: Message) -> Result<(), ProcessorError> {
        match msg.kind() {
            MessageKind::Event => self.process_event(msg),
            MessageKind::Timer => self.process_timer(msg),
            MessageKind::Outgoing => self.process_outgoing(msg),
            MessageKind::Incoming => self.process_incoming(msg),
            MessageKind::Generic => Err(ProcessorError::Unhandled {
                kind: MessageKind::Generic,
                processor: self.name(),
            }),
        }
    }

    fn id(&self) -> ProcessorId {
        self.base().id()
    }

    /// Component URI, or the class name if none was set.
    fn name(&self) -> String {
        self.base()
            .component_uri()
            .map(str::to_owned)
            .unwrap_or_else(|| self.class_name().to_owned())
    }

    /// Sends through the bound scheduler. The sender field must name this
    /// processor; a forged sender is a defect in the calling block.
    fn send_message(&self, msg: Message) -> Result<(), SchedulerError> {
        assert!(
            msg.from() == self.id(),
            "{} sent a message with forged sender {}",
            self.name(),
            msg.from()
        );
        self.base().scheduler().send_message(msg)
    }

    /// Announces an event id this processor publishes.
    fn register_event(&self, event_id: &str) {
        self.base()
            .listeners
            .lock()
            .entry(event_id.to_owned())
            .or_default();
    }

    /// Subscribes `listener` to an announced event. Returns false (with a
    /// warning) if the event id was never announced.
    fn register_listener(&self, event_id: &str, listener: ProcessorId) -> bool {
        let mut listeners = self.base().listeners.lock();
        match listeners.get_mut(event_id) {
            Some(subscribers) => {
                if !subscribers.contains(&listener) {
                    subscribers.push(listener);
                }
                true
            }
            None => {
                warn!(
                    processor = %self.name(),
                    event = event_id,
                    "listener registration for unannounced event"
                );
                false
            }
        }
    }

    fn unregister_listener(&self, event_id: &str, listener: ProcessorId) {
        if let Some(subscribers) = self.base().listeners.lock().get_mut(event_id) {
            subscribers.retain(|l| *l != listener);
        }
    }

    /// Publishes `event` to every subscriber of its event id. Each listener
    /// receives its own clone; no event instance is ever shared. An event
    /// id without subscribers is fail-soft: logged, not an error.
    fn notify_listeners(&self, event: &Message) -> Result<(), SchedulerError> {
        let Some(event_id) = event.event_id() else {
            warn!(processor = %self.name(), "notify_listeners on a message without event id");
            return Ok(());
        };
        let subscribers = {
            let listeners = self.base().listeners.lock();
            match listeners.get(event_id) {
                Some(subscribers) => subscribers.clone(),
                None => {
                    warn!(
                        processor = %self.name(),
                        event = event_id,
                        "event published without any listener registration"
                    );
                    return Ok(());
                }
            }
        };
        for listener in subscribers {
            let mut copy = event.clone();
            copy.redirect(self.id(), listener);
            self.send_message(copy)?;
        }
        Ok(())
    }
}
