//! CRC32 integrity block
//!
//! Outgoing: computes a CRC32 over the linearized payload and appends the
//! 4-byte big-endian digest. Incoming: splits the digest trailer off,
//! recomputes, and strips it on a match; a mismatch fails dispatch with
//! both digests in the error detail.

use std::sync::Arc;

use tracing::debug;

use super::{forward_to_next, forward_to_prev};
use codec::PayloadBuffer;
use runtime::{Message, MessageProcessor, MessageScheduler, ProcessorBase, ProcessorError};

const DIGEST_LEN: usize = 4;

pub struct CrcBlock {
    base: ProcessorBase,
}

impl CrcBlock {
    pub const URI: &'static str = "bb://netweave/crypt/crc32";

    pub fn new(scheduler: &Arc<dyn MessageScheduler>) -> Arc<Self> {
        Arc::new(CrcBlock {
            base: ProcessorBase::with_component_uri(scheduler, Self::URI),
        })
    }
}

impl MessageProcessor for CrcBlock {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn class_name(&self) -> &'static str {
        "CrcBlock"
    }

    fn process_outgoing(&self, mut msg: Message) -> Result<(), ProcessorError> {
        let digest = {
            let payload = msg.payload_mut();
            let flat = payload.linearize();
            let digest = crc32fast::hash(&flat);
            let mut trailer = PayloadBuffer::with_capacity(DIGEST_LEN);
            trailer.push_u32(digest);
            payload.push_back(trailer);
            digest
        };
        debug!(block = %self.name(), digest = format_args!("{digest:08x}"), "digest appended");
        forward_to_next(self, msg)
    }

    fn process_incoming(&self, mut msg: Message) -> Result<(), ProcessorError> {
        let body = {
            let payload = msg.payload_mut();
            let total = payload.len();
            if total < DIGEST_LEN {
                return Err(ProcessorError::Protocol {
                    detail: format!("payload of {total} bytes is shorter than a crc32 trailer"),
                });
            }
            let mut body = payload.pop_buffer(total - DIGEST_LEN)?;
            let expected = payload.pop_u32()?;
            let computed = crc32fast::hash(&body.linearize());
            if computed != expected {
                return Err(ProcessorError::Protocol {
                    detail: format!(
                        "crc32 mismatch: trailer {expected:08x}, computed {computed:08x}"
                    ),
                });
            }
            body
        };
        debug!(block = %self.name(), len = body.len(), "digest verified and stripped");
        msg.set_payload(body);
        forward_to_prev(self, msg)
    }
}
