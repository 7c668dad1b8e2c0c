//! Daemon endpoints
//!
//! [`ConsoleConnector`] is the application end of the stack: it injects
//! outgoing payloads subject to the flow's floating-packet window and counts
//! the payloads that come back. [`LoopbackAdapter`] is the network end: it
//! reflects everything that reaches it back up the incoming direction, so a
//! symmetric block chain must reproduce each injected payload byte for byte.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use codec::PayloadBuffer;
use runtime::{Message, MessageProcessor, MessageScheduler, ProcessorBase, ProcessorError};
use types::{FlowState, LocalFlowState, EVENT_FLOW_CONTROL};

pub struct ConsoleConnector {
    base: ProcessorBase,
    flow: Arc<LocalFlowState>,
    delivered: AtomicU64,
    mismatched: AtomicU64,
}

impl ConsoleConnector {
    pub const URI: &'static str = "app://netweave/console";

    pub fn new(scheduler: &Arc<dyn MessageScheduler>, flow: Arc<LocalFlowState>) -> Arc<Self> {
        Arc::new(ConsoleConnector {
            base: ProcessorBase::with_component_uri(scheduler, Self::URI),
            flow,
            delivered: AtomicU64::new(0),
            mismatched: AtomicU64::new(0),
        })
    }

    pub fn flow(&self) -> &Arc<LocalFlowState> {
        &self.flow
    }

    /// Payloads that completed the round trip.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Round-tripped payloads that did not echo the injected bytes.
    pub fn mismatched(&self) -> u64 {
        self.mismatched.load(Ordering::Acquire)
    }

    /// Whether the flow window currently has room for another injection.
    pub fn ready_to_send(&self) -> bool {
        self.flow.can_send_outgoing_packets()
    }

    /// Injects one payload into the outgoing direction. Returns false
    /// without sending when the flow window is closed.
    pub fn inject(&self, payload: PayloadBuffer) -> Result<bool, ProcessorError> {
        if !self.flow.can_send_outgoing_packets() {
            return Ok(false);
        }
        let Some(next) = self.base.next() else {
            return Err(ProcessorError::Protocol {
                detail: "console connector has no downstream neighbor wired".to_owned(),
            });
        };
        self.flow.inc_out_floating_packets();
        let mut msg = Message::outgoing(self.id(), next, payload);
        msg.set_flow_state(Some(self.flow.clone() as Arc<dyn FlowState>));
        if let Err(err) = self.send_message(msg) {
            // the packet never left, so give its window slot back
            self.flow.dec_out_floating_packets();
            return Err(err.into());
        }
        Ok(true)
    }
}

impl MessageProcessor for ConsoleConnector {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn class_name(&self) -> &'static str {
        "ConsoleConnector"
    }

    // deliveries may interleave across workers, so the check is on payload
    // shape rather than arrival order
    fn process_incoming(&self, mut msg: Message) -> Result<(), ProcessorError> {
        let payload = msg.payload_mut();
        let len = payload.len();
        self.delivered.fetch_add(1, Ordering::AcqRel);
        let was_blocked = !self.flow.can_send_outgoing_packets();
        self.flow.dec_out_floating_packets();
        if was_blocked && self.flow.can_send_outgoing_packets() {
            // window reopened; tell the flow's listeners
            for listener in self.flow.listeners() {
                let event = Message::event(self.id(), listener, EVENT_FLOW_CONTROL);
                self.send_message(event)?;
            }
        }
        match decode_sequence_payload(payload) {
            Some(seq) => debug!(seq, len, "payload delivered"),
            None => {
                self.mismatched.fetch_add(1, Ordering::AcqRel);
                warn!(len, "round-tripped payload does not match injection");
            }
        }
        Ok(())
    }
}

/// Network-facing multiplexer stand-in: reflects outgoing traffic straight
/// back up the incoming direction.
pub struct LoopbackAdapter {
    base: ProcessorBase,
    reflected: AtomicU64,
}

impl LoopbackAdapter {
    pub const URI: &'static str = "net://netweave/loopback";

    pub fn new(scheduler: &Arc<dyn MessageScheduler>) -> Arc<Self> {
        Arc::new(LoopbackAdapter {
            base: ProcessorBase::with_component_uri(scheduler, Self::URI),
            reflected: AtomicU64::new(0),
        })
    }

    pub fn reflected(&self) -> u64 {
        self.reflected.load(Ordering::Acquire)
    }
}

impl MessageProcessor for LoopbackAdapter {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn class_name(&self) -> &'static str {
        "LoopbackAdapter"
    }

    // reflection never mutates shared state beyond a counter
    fn is_threadsafe(&self) -> bool {
        true
    }

    fn process_outgoing(&self, msg: Message) -> Result<(), ProcessorError> {
        let Some(prev) = self.base.prev() else {
            return Err(ProcessorError::Protocol {
                detail: "loopback adapter has no upstream neighbor wired".to_owned(),
            });
        };
        let flow = msg.flow_state().cloned();
        let mut reply = Message::incoming(self.id(), prev, msg.into_payload());
        reply.set_flow_state(flow);
        self.reflected.fetch_add(1, Ordering::AcqRel);
        self.send_message(reply)?;
        Ok(())
    }
}

const PAYLOAD_MARKER: &str = "netweave ping";

/// Deterministic per-sequence payload so the connector can verify echoes.
pub fn sequence_payload(seq: u64) -> PayloadBuffer {
    let mut payload = PayloadBuffer::with_capacity(8 + PAYLOAD_MARKER.len());
    payload.push_u32((seq >> 32) as u32);
    payload.push_u32(seq as u32);
    payload.push_string(PAYLOAD_MARKER);
    payload
}

/// Reads back a [`sequence_payload`], returning its sequence number, or
/// `None` if the bytes are not one.
fn decode_sequence_payload(payload: &mut PayloadBuffer) -> Option<u64> {
    if payload.len() != 8 + PAYLOAD_MARKER.len() {
        return None;
    }
    let hi = payload.pop_u32().ok()?;
    let lo = payload.pop_u32().ok()?;
    let marker = payload.pop_string(PAYLOAD_MARKER.len()).ok()?;
    (marker == PAYLOAD_MARKER).then_some(u64::from(hi) << 32 | u64::from(lo))
}
