//! # netweave Payload Codec
//!
//! The byte-level substrate every building block shares: a segmented
//! payload buffer with big-endian wire primitives, a header
//! serialization contract, and a bounded buffer pool for traffic sources
//! that recycle allocations.
//!
//! ## Design
//!
//! Payloads are scatter-lists of immutable segments so protocol layers can
//! prepend and append headers without copying the body. Writes go into a
//! fixed-capacity head region; overrunning it is a defect in the writing
//! block and panics. Reads always consume from the front and report short
//! data as [`BufferError::Underflow`], because truncated bytes arrive from
//! the wire and must surface as loggable errors, not crashes.

pub mod buffer;
pub mod error;
pub mod pool;

pub use buffer::{Header, PayloadBuffer};
pub use error::BufferError;
pub use pool::BufferPool;
