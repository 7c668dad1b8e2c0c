//! Cipher-header block
//!
//! Outgoing: prepends a [`CipherHeader`] naming the transform suite applied
//! to the payload plus the flow id, so the receiving stack can bind the
//! packet to its session before the payload is touched. Incoming: pops the
//! header, rejects unknown suites, and forwards the bare payload.

use std::sync::Arc;

use tracing::debug;

use super::{forward_to_next, forward_to_prev};
use codec::{BufferError, Header, PayloadBuffer};
use runtime::{Message, MessageProcessor, MessageScheduler, ProcessorBase, ProcessorError};

/// Wire header: suite-name length, suite name, 64-bit flow id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CipherHeader {
    pub suite: String,
    pub flow_id: u64,
}

impl Header for CipherHeader {
    fn serialize(&self) -> PayloadBuffer {
        let mut buf = PayloadBuffer::with_capacity(1 + self.suite.len() + 8);
        buf.push_u8(self.suite.len() as u8);
        buf.push_string(&self.suite);
        buf.push_u32((self.flow_id >> 32) as u32);
        buf.push_u32(self.flow_id as u32);
        buf
    }

    fn deserialize(&mut self, buf: &mut PayloadBuffer) -> Result<(), BufferError> {
        let len = buf.pop_u8()?;
        self.suite = buf.pop_string(usize::from(len))?;
        let hi = buf.pop_u32()?;
        let lo = buf.pop_u32()?;
        self.flow_id = u64::from(hi) << 32 | u64::from(lo);
        Ok(())
    }
}

pub struct HeaderBlock {
    base: ProcessorBase,
}

impl HeaderBlock {
    pub const URI: &'static str = "bb://netweave/crypt/header";

    /// Suite tag for the shipped crc32/pad transform chain.
    pub const SUITE: &'static str = "crc32-pad";

    pub fn new(scheduler: &Arc<dyn MessageScheduler>) -> Arc<Self> {
        Arc::new(HeaderBlock {
            base: ProcessorBase::with_component_uri(scheduler, Self::URI),
        })
    }
}

impl MessageProcessor for HeaderBlock {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn class_name(&self) -> &'static str {
        "HeaderBlock"
    }

    fn process_outgoing(&self, mut msg: Message) -> Result<(), ProcessorError> {
        let flow_id = msg.flow_state().map(|fs| fs.flow_id()).unwrap_or(0);
        msg.payload_mut().push_header(&CipherHeader {
            suite: Self::SUITE.to_owned(),
            flow_id,
        });
        debug!(block = %self.name(), suite = Self::SUITE, flow_id, "header pushed");
        forward_to_next(self, msg)
    }

    fn process_incoming(&self, mut msg: Message) -> Result<(), ProcessorError> {
        let header: CipherHeader = msg.payload_mut().pop_header()?;
        if header.suite != Self::SUITE {
            return Err(ProcessorError::Protocol {
                detail: format!("unknown transform suite '{}'", header.suite),
            });
        }
        debug!(block = %self.name(), flow_id = header.flow_id, "header verified and stripped");
        forward_to_prev(self, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::testing::CaptureScheduler;
    use types::{FlowState, LocalFlowState, ProcessorId};

    fn wired_block() -> (Arc<CaptureScheduler>, Arc<HeaderBlock>) {
        let capture = Arc::new(CaptureScheduler::new("header-test"));
        let sched: Arc<dyn MessageScheduler> = capture.clone();
        let block = HeaderBlock::new(&sched);
        block.base().set_next(Some(ProcessorId::next()));
        block.base().set_prev(Some(ProcessorId::next()));
        (capture, block)
    }

    #[test]
    fn outgoing_header_carries_the_flow_id() {
        let (capture, block) = wired_block();
        let flow = Arc::new(LocalFlowState::new());
        let mut msg = Message::outgoing(
            block.id(),
            block.id(),
            PayloadBuffer::from_slice(b"payload"),
        );
        msg.set_flow_state(Some(flow.clone() as Arc<dyn FlowState>));

        block.process_outgoing(msg).unwrap();

        let mut sent = capture.take_sent();
        let header: CipherHeader = sent[0].payload_mut().pop_header().unwrap();
        assert_eq!(header.suite, HeaderBlock::SUITE);
        assert_eq!(header.flow_id, flow.flow_id());
        assert_eq!(sent[0].payload().to_vec(), b"payload");
    }

    #[test]
    fn incoming_strips_a_matching_header() {
        let (capture, block) = wired_block();
        let msg = Message::outgoing(
            block.id(),
            block.id(),
            PayloadBuffer::from_slice(b"payload"),
        );
        block.process_outgoing(msg).unwrap();
        let wire = capture.take_sent().remove(0);

        let incoming = Message::incoming(block.id(), block.id(), wire.into_payload());
        block.process_incoming(incoming).unwrap();

        let delivered = capture.take_sent();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload().to_vec(), b"payload");
        assert_eq!(delivered[0].to(), block.base().prev().unwrap());
    }

    #[test]
    fn unknown_suite_is_rejected() {
        let (capture, block) = wired_block();
        let mut wire = PayloadBuffer::from_slice(b"payload");
        wire.push_header(&CipherHeader {
            suite: "rot13".to_owned(),
            flow_id: 7,
        });
        let incoming = Message::incoming(block.id(), block.id(), wire);
        let err = block.process_incoming(incoming).unwrap_err();
        assert!(matches!(err, ProcessorError::Protocol { ref detail } if detail.contains("rot13")));
        assert!(capture.take_sent().is_empty());
    }

    #[test]
    fn truncated_header_is_a_buffer_error() {
        let (_capture, block) = wired_block();
        let incoming = Message::incoming(block.id(), block.id(), PayloadBuffer::from_slice(&[5]));
        let err = block.process_incoming(incoming).unwrap_err();
        assert!(matches!(err, ProcessorError::Buffer(_)));
    }
}
