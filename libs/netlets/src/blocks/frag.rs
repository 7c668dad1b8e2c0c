//! Fragmentation block
//!
//! Outgoing: splits payloads larger than [`FragBlock::MAX_FRAGMENT`] into
//! numbered fragments, each prefixed with a [`FragHeader`], and sends one
//! message per fragment. Incoming: strips the header and buffers fragments
//! per message id until the set is complete, then forwards the reassembled
//! payload. Fragments may arrive in any order; reassembly goes by index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{forward_to_next, forward_to_prev};
use codec::{BufferError, Header, PayloadBuffer};
use runtime::{Message, MessageProcessor, MessageScheduler, ProcessorBase, ProcessorError};

/// Per-fragment wire header: message id, fragment index, fragment count.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FragHeader {
    pub message: u32,
    pub index: u16,
    pub total: u16,
}

impl Header for FragHeader {
    fn serialize(&self) -> PayloadBuffer {
        let mut buf = PayloadBuffer::with_capacity(8);
        buf.push_u32(self.message);
        buf.push_u16(self.index);
        buf.push_u16(self.total);
        buf
    }

    fn deserialize(&mut self, buf: &mut PayloadBuffer) -> Result<(), BufferError> {
        self.message = buf.pop_u32()?;
        self.index = buf.pop_u16()?;
        self.total = buf.pop_u16()?;
        Ok(())
    }
}

struct Reassembly {
    fragments: Vec<Option<PayloadBuffer>>,
    received: usize,
}

pub struct FragBlock {
    base: ProcessorBase,
    next_message: AtomicU32,
    partial: Mutex<HashMap<u32, Reassembly>>,
}

impl FragBlock {
    pub const URI: &'static str = "bb://netweave/crypt/frag";

    /// Largest fragment body put on the wire.
    pub const MAX_FRAGMENT: usize = 256;

    pub fn new(scheduler: &Arc<dyn MessageScheduler>) -> Arc<Self> {
        Arc::new(FragBlock {
            base: ProcessorBase::with_component_uri(scheduler, Self::URI),
            next_message: AtomicU32::new(0),
            partial: Mutex::new(HashMap::new()),
        })
    }

    /// Message ids with fragments still outstanding.
    pub fn pending_reassemblies(&self) -> usize {
        self.partial.lock().len()
    }
}

impl MessageProcessor for FragBlock {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn class_name(&self) -> &'static str {
        "FragBlock"
    }

    fn process_outgoing(&self, mut msg: Message) -> Result<(), ProcessorError> {
        let message = self.next_message.fetch_add(1, Ordering::Relaxed);
        let mut payload = std::mem::take(msg.payload_mut());
        let len = payload.len();
        let total = len.div_ceil(Self::MAX_FRAGMENT).max(1);
        if total > usize::from(u16::MAX) {
            return Err(ProcessorError::Protocol {
                detail: format!("payload of {len} bytes exceeds the fragment count limit"),
            });
        }

        debug!(block = %self.name(), message, len, fragments = total, "fragmenting payload");
        for index in 0..total {
            let take = payload.len().min(Self::MAX_FRAGMENT);
            let mut body = payload.pop_buffer(take)?;
            body.push_header(&FragHeader {
                message,
                index: index as u16,
                total: total as u16,
            });
            let mut fragment = msg.clone();
            fragment.set_payload(body);
            forward_to_next(self, fragment)?;
        }
        Ok(())
    }

    fn process_incoming(&self, mut msg: Message) -> Result<(), ProcessorError> {
        let header: FragHeader = msg.payload_mut().pop_header()?;
        if header.total == 0 || header.index >= header.total {
            return Err(ProcessorError::Protocol {
                detail: format!(
                    "fragment {}/{} of message {} is out of range",
                    header.index, header.total, header.message
                ),
            });
        }
        if header.total == 1 {
            return forward_to_prev(self, msg);
        }

        let body = std::mem::take(msg.payload_mut());
        let complete = {
            let mut partial = self.partial.lock();
            let entry = partial
                .entry(header.message)
                .or_insert_with(|| Reassembly {
                    fragments: vec![None; usize::from(header.total)],
                    received: 0,
                });
            if entry.fragments.len() != usize::from(header.total) {
                return Err(ProcessorError::Protocol {
                    detail: format!(
                        "message {} fragments disagree on count ({} vs {})",
                        header.message,
                        entry.fragments.len(),
                        header.total
                    ),
                });
            }
            let slot = &mut entry.fragments[usize::from(header.index)];
            if slot.is_some() {
                return Err(ProcessorError::Protocol {
                    detail: format!(
                        "duplicate fragment {} of message {}",
                        header.index, header.message
                    ),
                });
            }
            *slot = Some(body);
            entry.received += 1;
            if entry.received == entry.fragments.len() {
                partial.remove(&header.message)
            } else {
                None
            }
        };

        let Some(done) = complete else {
            return Ok(());
        };
        let mut joined = PayloadBuffer::new();
        for fragment in done.fragments.into_iter().flatten() {
            joined.push_back(fragment);
        }
        debug!(
            block = %self.name(),
            message = header.message,
            len = joined.len(),
            "payload reassembled"
        );
        msg.set_payload(joined);
        forward_to_prev(self, msg)
    }
}
