//! The unit of communication
//!
//! A [`Message`] pairs a kind discriminant with a `from`/`to` processor
//! pair, an optional flow-state reference, a property bag, and (for
//! data-carrying kinds) a payload buffer. Messages are owned values moved
//! through queues; cloning is explicit and deep-copies the property bag,
//! so no two in-flight messages alias metadata.

use std::sync::Arc;

use codec::PayloadBuffer;
use types::{FlowState, OperationalState, ProcessorId, PropertyBag, PropertyId, PropertyValue};

/// Discriminant every dispatch decision is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Published to event listeners.
    Event,
    /// One-shot delayed self-delivery.
    Timer,
    /// Data traveling toward the application.
    Incoming,
    /// Data traveling toward the network.
    Outgoing,
    /// Undirected; no processor handles these by default.
    Generic,
}

#[derive(Debug, Clone)]
pub struct Message {
    kind: MessageKind,
    from: ProcessorId,
    to: ProcessorId,
    event_id: Option<String>,
    flow_state: Option<Arc<dyn FlowState>>,
    properties: PropertyBag,
    payload: PayloadBuffer,
    visited: Vec<ProcessorId>,
}

impl Message {
    fn new(kind: MessageKind, from: ProcessorId, to: ProcessorId) -> Self {
        Message {
            kind,
            from,
            to,
            event_id: None,
            flow_state: None,
            properties: PropertyBag::new(),
            payload: PayloadBuffer::new(),
            visited: Vec::new(),
        }
    }

    /// A data message traveling toward the network.
    pub fn outgoing(from: ProcessorId, to: ProcessorId, payload: PayloadBuffer) -> Self {
        let mut msg = Self::new(MessageKind::Outgoing, from, to);
        msg.payload = payload;
        msg
    }

    /// A data message traveling toward the application.
    pub fn incoming(from: ProcessorId, to: ProcessorId, payload: PayloadBuffer) -> Self {
        let mut msg = Self::new(MessageKind::Incoming, from, to);
        msg.payload = payload;
        msg
    }

    /// An event published under `event_id`.
    pub fn event(from: ProcessorId, to: ProcessorId, event_id: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageKind::Event, from, to);
        msg.event_id = Some(event_id.into());
        msg
    }

    /// A timer self-delivery for `owner`.
    pub fn timer(owner: ProcessorId) -> Self {
        Self::new(MessageKind::Timer, owner, owner)
    }

    pub fn generic(from: ProcessorId, to: ProcessorId) -> Self {
        Self::new(MessageKind::Generic, from, to)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn from(&self) -> ProcessorId {
        self.from
    }

    pub fn to(&self) -> ProcessorId {
        self.to
    }

    pub fn set_from(&mut self, from: ProcessorId) {
        self.from = from;
    }

    pub fn set_to(&mut self, to: ProcessorId) {
        self.to = to;
    }

    /// Re-addresses the message in one step, the usual move when a block
    /// hands a transformed message to a neighbor.
    pub fn redirect(&mut self, from: ProcessorId, to: ProcessorId) {
        self.from = from;
        self.to = to;
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn payload(&self) -> &PayloadBuffer {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut PayloadBuffer {
        &mut self.payload
    }

    pub fn set_payload(&mut self, payload: PayloadBuffer) {
        self.payload = payload;
    }

    pub fn into_payload(self) -> PayloadBuffer {
        self.payload
    }

    pub fn flow_state(&self) -> Option<&Arc<dyn FlowState>> {
        self.flow_state.as_ref()
    }

    pub fn set_flow_state(&mut self, flow_state: Option<Arc<dyn FlowState>>) {
        self.flow_state = flow_state;
    }

    /// Whether the attached flow state, if any, is already stale. Used to
    /// demote the severity of drop logging for expected races.
    pub fn is_flow_stale(&self) -> bool {
        self.flow_state
            .as_ref()
            .is_some_and(|fs| fs.operational_state() == OperationalState::Stale)
    }

    pub fn set_property(&mut self, id: PropertyId, value: PropertyValue) {
        self.properties.set(id, value);
    }

    pub fn property(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.properties.get(id)
    }

    pub fn has_property(&self, id: PropertyId) -> bool {
        self.properties.contains(id)
    }

    pub fn take_property(&mut self, id: PropertyId) -> Option<PropertyValue> {
        self.properties.take(id)
    }

    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    /// Records a dispatch stop in the loop-diagnostic trace. Returns true
    /// if this processor was already visited.
    pub fn record_visit(&mut self, processor: ProcessorId) -> bool {
        let seen = self.visited.contains(&processor);
        self.visited.push(processor);
        seen
    }

    /// The loop-diagnostic trace, in dispatch order.
    pub fn visited(&self) -> &[ProcessorId] {
        &self.visited
    }

    /// Clears the loop-diagnostic trace, e.g. when a message is re-injected
    /// at the head of a chain.
    pub fn flush_visited(&mut self) {
        self.visited.clear();
    }
}
