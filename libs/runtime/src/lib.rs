//! # netweave Message-Passing Core
//!
//! The concurrent substrate the rest of the system is built on: typed
//! messages, the processor contract, per-processor FIFO queues, and the
//! worker-pool scheduler with its registration protocol, one-shot timers,
//! and intra-process cross-scheduler handoff.
//!
//! ## Architecture
//!
//! Every processing unit (building block, connector, adapter) implements
//! [`MessageProcessor`] and is registered with exactly one
//! [`MessageScheduler`]. Sending is always indirect: a processor addresses
//! a [`Message`] to a [`ProcessorId`](types::ProcessorId) and the owning
//! scheduler routes it — onto the destination's queue, onto a staged
//! queue for a not-yet-committed registration, or across to another
//! scheduler found through the [`SchedulerRegistry`].
//!
//! Ordering is FIFO per destination queue; fairness across destinations is
//! round-robin per worker. Nothing in this crate blocks inside dispatch —
//! blocking I/O belongs to adapters and connectors built on top.

pub mod concurrent;
pub mod message;
pub mod processor;
pub mod queue;
pub mod scheduler;
pub mod testing;
mod timer;

pub use concurrent::{ConcurrentScheduler, ConcurrentSchedulerBuilder};
pub use message::{Message, MessageKind};
pub use processor::{MessageProcessor, ProcessorBase, ProcessorError};
pub use queue::SyncMessageQueue;
pub use scheduler::{
    LocalRegistry, MessageScheduler, SchedulerError, SchedulerRegistry, TimerToken,
};
