//! # netweave Core Types
//!
//! Foundational types shared by every layer of the runtime: processor
//! identity, the tagged property-value system attached to messages, and the
//! flow-state contract consumed (but not owned) by the scheduler core.
//!
//! Everything here is deliberately free of scheduler or pipeline logic so
//! that building blocks, adapters, and connectors can depend on it without
//! pulling in the runtime.

pub mod flow;
pub mod ident;
pub mod property;

pub use flow::{
    FlowState, LocalFlowState, OperationalState, DEFAULT_MAX_FLOATING_PACKETS,
    EVENT_FLOW_CONTROL, EVENT_FLOW_STATE_CHANGED,
};
pub use ident::{hash_uri, IdHash, ProcessorId};
pub use property::{
    CustomValue, PropertyBag, PropertyId, PropertyValue, ValueError, ValueShape, ValueTag,
};
