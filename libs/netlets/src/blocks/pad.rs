//! Block-alignment padding
//!
//! Outgoing: appends zero bytes so that the padded payload plus the 4-byte
//! big-endian pad-length trailer lands on a 16-byte boundary. Incoming:
//! reads the trailer, validates the claimed pad length against the body,
//! and strips both.

use std::sync::Arc;

use tracing::debug;

use super::{forward_to_next, forward_to_prev};
use codec::PayloadBuffer;
use runtime::{Message, MessageProcessor, MessageScheduler, ProcessorBase, ProcessorError};

const BLOCK_LEN: usize = 16;
const TRAILER_LEN: usize = 4;

pub struct PadBlock {
    base: ProcessorBase,
}

impl PadBlock {
    pub const URI: &'static str = "bb://netweave/crypt/pad";

    pub fn new(scheduler: &Arc<dyn MessageScheduler>) -> Arc<Self> {
        Arc::new(PadBlock {
            base: ProcessorBase::with_component_uri(scheduler, Self::URI),
        })
    }
}

impl MessageProcessor for PadBlock {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn class_name(&self) -> &'static str {
        "PadBlock"
    }

    fn process_outgoing(&self, mut msg: Message) -> Result<(), ProcessorError> {
        let pad = {
            let payload = msg.payload_mut();
            let pad = (BLOCK_LEN - (payload.len() + TRAILER_LEN) % BLOCK_LEN) % BLOCK_LEN;
            let mut trailer = PayloadBuffer::with_capacity(pad + TRAILER_LEN);
            trailer.push_bytes(&vec![0u8; pad]);
            trailer.push_u32(pad as u32);
            payload.push_back(trailer);
            pad
        };
        debug!(block = %self.name(), pad, "payload padded");
        forward_to_next(self, msg)
    }

    fn process_incoming(&self, mut msg: Message) -> Result<(), ProcessorError> {
        let body = {
            let payload = msg.payload_mut();
            let total = payload.len();
            if total < TRAILER_LEN {
                return Err(ProcessorError::Protocol {
                    detail: format!("payload of {total} bytes is shorter than a pad trailer"),
                });
            }
            let mut body = payload.pop_buffer(total - TRAILER_LEN)?;
            let pad = payload.pop_u32()? as usize;
            if pad > body.len() {
                return Err(ProcessorError::Protocol {
                    detail: format!(
                        "pad trailer claims {pad} bytes but only {} remain",
                        body.len()
                    ),
                });
            }
            body.truncate(body.len() - pad);
            body
        };
        debug!(block = %self.name(), len = body.len(), "padding stripped");
        msg.set_payload(body);
        forward_to_prev(self, msg)
    }
}
