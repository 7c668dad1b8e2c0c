//! Processor identity
//!
//! Every message processor gets a process-unique [`ProcessorId`] at
//! construction time. The id is a plain handle: it never owns the processor
//! and stays valid as a map key even after the processor is gone, which is
//! what lets `prev`/`next` links and scheduler tables avoid dangling
//! references entirely.
//!
//! Component URIs (`bb://...`, `netlet://...`) are additionally hashed so
//! identity comparisons on the hot path never touch the string.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hash of a component URI, used for fast identity comparison.
pub type IdHash = u32;

static NEXT_PROCESSOR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, non-owning handle to a message processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(u64);

impl ProcessorId {
    /// Allocates a fresh id. Never returns the same value twice within a
    /// process.
    pub fn next() -> Self {
        ProcessorId(NEXT_PROCESSOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mp#{}", self.0)
    }
}

/// ELF hash over a component URI.
///
/// Stable across platforms, so hashes may be logged and compared between
/// runs.
pub fn hash_uri(uri: &str) -> IdHash {
    let mut hash: u32 = 0;
    for byte in uri.bytes() {
        hash = (hash << 4).wrapping_add(byte as u32);
        let high = hash & 0xf000_0000;
        if high != 0 {
            hash ^= high >> 24;
        }
        hash &= !high;
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn processor_ids_are_unique() {
        let ids: HashSet<ProcessorId> = (0..1000).map(|_| ProcessorId::next()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn uri_hash_is_stable() {
        let a = hash_uri("bb://netweave/crypt/crc");
        let b = hash_uri("bb://netweave/crypt/crc");
        assert_eq!(a, b);
    }

    #[test]
    fn uri_hash_distinguishes_components() {
        assert_ne!(
            hash_uri("bb://netweave/crypt/crc"),
            hash_uri("bb://netweave/crypt/pad")
        );
    }

    #[test]
    fn empty_uri_hashes_to_zero() {
        assert_eq!(hash_uri(""), 0);
    }
}
