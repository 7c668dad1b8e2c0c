//! Flow-state contract
//!
//! Per-session state shared between an application connector and the
//! building blocks serving that session. The scheduler core never inspects
//! flow state beyond reading the operational state for log severity; the
//! backpressure policy (floating-packet window) lives entirely here.
//!
//! State-change and flow-control notifications travel to listeners as
//! ordinary event messages sent by whichever endpoint owns the flow state;
//! the event ids are [`EVENT_FLOW_STATE_CHANGED`] and
//! [`EVENT_FLOW_CONTROL`].

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::ident::ProcessorId;

/// Event id published when a flow changes operational state.
pub const EVENT_FLOW_STATE_CHANGED: &str = "event://netweave/flow/state-changed";

/// Event id published when the floating-packet window opens again.
pub const EVENT_FLOW_CONTROL: &str = "event://netweave/flow/flow-control";

/// Default outgoing floating-packet window.
pub const DEFAULT_MAX_FLOATING_PACKETS: i64 = 16;

/// Health of a communication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalState {
    Valid,
    Stale,
    Ended,
}

impl fmt::Display for OperationalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationalState::Valid => write!(f, "valid"),
            OperationalState::Stale => write!(f, "stale"),
            OperationalState::Ended => write!(f, "ended"),
        }
    }
}

/// Contract every flow-state implementation exposes to the core.
pub trait FlowState: fmt::Debug + Send + Sync {
    fn flow_id(&self) -> u64;

    fn operational_state(&self) -> OperationalState;

    /// Updates the state. `sender` identifies the processor responsible for
    /// the change so listeners can attribute the notification.
    fn set_operational_state(&self, sender: ProcessorId, state: OperationalState);

    /// Whether the outgoing floating-packet window has room.
    fn can_send_outgoing_packets(&self) -> bool;

    fn inc_out_floating_packets(&self);

    fn dec_out_floating_packets(&self);

    fn add_listener(&self, listener: ProcessorId);

    fn remove_listener(&self, listener: ProcessorId);

    fn listeners(&self) -> Vec<ProcessorId>;
}

const STATE_VALID: u8 = 0;
const STATE_STALE: u8 = 1;
const STATE_ENDED: u8 = 2;

static NEXT_FLOW_ID: AtomicU64 = AtomicU64::new(1);

/// Reference flow-state implementation backed by atomics.
#[derive(Debug)]
pub struct LocalFlowState {
    id: u64,
    state: AtomicU8,
    out_floating: AtomicI64,
    max_floating: i64,
    listeners: Mutex<Vec<ProcessorId>>,
}

impl LocalFlowState {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_MAX_FLOATING_PACKETS)
    }

    pub fn with_window(max_floating: i64) -> Self {
        LocalFlowState {
            id: NEXT_FLOW_ID.fetch_add(1, Ordering::Relaxed),
            state: AtomicU8::new(STATE_VALID),
            out_floating: AtomicI64::new(0),
            max_floating,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn out_floating_packets(&self) -> i64 {
        self.out_floating.load(Ordering::Acquire)
    }
}

impl Default for LocalFlowState {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowState for LocalFlowState {
    fn flow_id(&self) -> u64 {
        self.id
    }

    fn operational_state(&self) -> OperationalState {
        match self.state.load(Ordering::Acquire) {
            STATE_STALE => OperationalState::Stale,
            STATE_ENDED => OperationalState::Ended,
            _ => OperationalState::Valid,
        }
    }

    fn set_operational_state(&self, sender: ProcessorId, state: OperationalState) {
        let raw = match state {
            OperationalState::Valid => STATE_VALID,
            OperationalState::Stale => STATE_STALE,
            OperationalState::Ended => STATE_ENDED,
        };
        let old = self.state.swap(raw, Ordering::AcqRel);
        if old != raw {
            tracing::debug!(
                flow = self.id,
                sender = %sender,
                state = %state,
                "flow operational state changed"
            );
        }
    }

    fn can_send_outgoing_packets(&self) -> bool {
        self.out_floating.load(Ordering::Acquire) < self.max_floating
    }

    fn inc_out_floating_packets(&self) {
        self.out_floating.fetch_add(1, Ordering::AcqRel);
    }

    fn dec_out_floating_packets(&self) {
        let prev = self.out_floating.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "floating packet counter underflow");
    }

    fn add_listener(&self, listener: ProcessorId) {
        let mut listeners = self.listeners.lock();
        if !listeners.contains(&listener) {
            listeners.push(listener);
        }
    }

    fn remove_listener(&self, listener: ProcessorId) {
        self.listeners.lock().retain(|l| *l != listener);
    }

    fn listeners(&self) -> Vec<ProcessorId> {
        self.listeners.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_gates_outgoing_packets() {
        let fs = LocalFlowState::with_window(2);
        assert!(fs.can_send_outgoing_packets());
        fs.inc_out_floating_packets();
        fs.inc_out_floating_packets();
        assert!(!fs.can_send_outgoing_packets());
        fs.dec_out_floating_packets();
        assert!(fs.can_send_outgoing_packets());
    }

    #[test]
    fn state_transitions_are_visible() {
        let fs = LocalFlowState::new();
        assert_eq!(fs.operational_state(), OperationalState::Valid);
        fs.set_operational_state(ProcessorId::next(), OperationalState::Stale);
        assert_eq!(fs.operational_state(), OperationalState::Stale);
        fs.set_operational_state(ProcessorId::next(), OperationalState::Ended);
        assert_eq!(fs.operational_state(), OperationalState::Ended);
    }

    #[test]
    fn listeners_are_deduplicated() {
        let fs = LocalFlowState::new();
        let p = ProcessorId::next();
        fs.add_listener(p);
        fs.add_listener(p);
        assert_eq!(fs.listeners(), vec![p]);
        fs.remove_listener(p);
        assert!(fs.listeners().is_empty());
    }

    #[test]
    fn flow_ids_are_unique() {
        assert_ne!(LocalFlowState::new().flow_id(), LocalFlowState::new().flow_id());
    }
}
