//! Building blocks
//!
//! Each block transforms a message and hands it to a pipeline neighbor:
//! `process_outgoing` forwards toward `next`, `process_incoming` toward
//! `prev`. Every transformation that changes the wire form must have an
//! exact dual on the opposite direction.

mod crc;
mod frag;
mod header;
mod pad;

pub use crc::CrcBlock;
pub use frag::{FragBlock, FragHeader};
pub use header::{CipherHeader, HeaderBlock};
pub use pad::PadBlock;

use runtime::{Message, MessageProcessor, ProcessorError};

pub(crate) fn forward_to_next(
    block: &dyn MessageProcessor,
    mut msg: Message,
) -> Result<(), ProcessorError> {
    let Some(next) = block.base().next() else {
        return Err(ProcessorError::Protocol {
            detail: format!("{} has no downstream neighbor wired", block.name()),
        });
    };
    msg.redirect(block.id(), next);
    block.send_message(msg)?;
    Ok(())
}

pub(crate) fn forward_to_prev(
    block: &dyn MessageProcessor,
    mut msg: Message,
) -> Result<(), ProcessorError> {
    let Some(prev) = block.base().prev() else {
        return Err(ProcessorError::Protocol {
            detail: format!("{} has no upstream neighbor wired", block.name()),
        });
    };
    msg.redirect(block.id(), prev);
    block.send_message(msg)?;
    Ok(())
}
