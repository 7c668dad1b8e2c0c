//! Segmented payload buffers and wire primitives
//!
//! A [`PayloadBuffer`] is an ordered sequence of immutable byte segments
//! plus an optional fixed-capacity writable head. Splicing whole buffers
//! onto the front or back moves segment handles, never bytes, which is how
//! protocol layers stack headers cheaply.
//!
//! All multi-byte integers use network byte order. Strings carry no length
//! prefix or terminator; callers frame lengths themselves, as every
//! concrete header in the system does.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::error::BufferError;

/// Contract for concrete wire headers.
///
/// `serialize` produces the header's bytes as a standalone buffer;
/// `deserialize` consumes the header's bytes from the front of `buf`.
pub trait Header {
    fn serialize(&self) -> PayloadBuffer;
    fn deserialize(&mut self, buf: &mut PayloadBuffer) -> Result<(), BufferError>;
}

/// Scatter-list payload buffer with a write cursor.
#[derive(Debug, Default)]
pub struct PayloadBuffer {
    segments: VecDeque<Bytes>,
    write: Option<BytesMut>,
    write_capacity: usize,
}

impl PayloadBuffer {
    /// An empty buffer with no writable region.
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer whose writable head can hold exactly `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        PayloadBuffer {
            segments: VecDeque::new(),
            write: Some(BytesMut::with_capacity(capacity)),
            write_capacity: capacity,
        }
    }

    /// A read-only buffer over a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_bytes(Bytes::copy_from_slice(data))
    }

    /// A read-only buffer over an existing segment, zero-copy.
    pub fn from_bytes(data: Bytes) -> Self {
        let mut segments = VecDeque::new();
        if !data.is_empty() {
            segments.push_back(data);
        }
        PayloadBuffer {
            segments,
            write: None,
            write_capacity: 0,
        }
    }

    pub(crate) fn from_writable(write: BytesMut, capacity: usize) -> Self {
        PayloadBuffer {
            segments: VecDeque::new(),
            write: Some(write),
            write_capacity: capacity,
        }
    }

    /// Reclaims the writable allocation, if this buffer still has one.
    pub(crate) fn into_writable(self) -> Option<BytesMut> {
        self.write
    }

    /// Total bytes held, frozen segments plus pending writes.
    pub fn len(&self) -> usize {
        let frozen: usize = self.segments.iter().map(|s| s.len()).sum();
        frozen + self.write.as_ref().map_or(0, |w| w.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes written into the writable head so far.
    pub fn cursor(&self) -> usize {
        self.write.as_ref().map_or(0, |w| w.len())
    }

    /// Room left in the writable head.
    pub fn remaining_capacity(&self) -> usize {
        self.write_capacity - self.cursor()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len() + usize::from(self.write.as_ref().is_some_and(|w| !w.is_empty()))
    }

    /// Drops all content and the writable region.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.write = None;
        self.write_capacity = 0;
    }

    fn freeze_write(&mut self) {
        if let Some(w) = self.write.take() {
            if !w.is_empty() {
                self.segments.push_back(w.freeze());
            }
            self.write_capacity = 0;
        }
    }

    fn writable(&mut self, size: usize) -> &mut BytesMut {
        let remaining = self.remaining_capacity();
        let Some(w) = self.write.as_mut() else {
            panic!("write of {size} bytes into a buffer with no writable region");
        };
        assert!(
            size <= remaining,
            "payload buffer overflow: write of {size} bytes exceeds remaining capacity {remaining}"
        );
        w
    }

    // --- write primitives -------------------------------------------------

    pub fn push_u32(&mut self, value: u32) {
        self.writable(4).extend_from_slice(&value.to_be_bytes());
    }

    pub fn push_u16(&mut self, value: u16) {
        self.writable(2).extend_from_slice(&value.to_be_bytes());
    }

    pub fn push_u8(&mut self, value: u8) {
        self.writable(1).extend_from_slice(&[value]);
    }

    /// Writes the raw bytes of `value`, no length prefix or terminator.
    pub fn push_string(&mut self, value: &str) {
        self.writable(value.len()).extend_from_slice(value.as_bytes());
    }

    pub fn push_bytes(&mut self, value: &[u8]) {
        self.writable(value.len()).extend_from_slice(value);
    }

    // --- splicing ---------------------------------------------------------

    /// Prepends `other`'s content, moving segment handles only.
    pub fn push_front(&mut self, mut other: PayloadBuffer) {
        self.freeze_write();
        other.freeze_write();
        while let Some(seg) = other.segments.pop_back() {
            self.segments.push_front(seg);
        }
    }

    /// Appends `other`'s content, moving segment handles only.
    pub fn push_back(&mut self, mut other: PayloadBuffer) {
        self.freeze_write();
        other.freeze_write();
        self.segments.append(&mut other.segments);
    }

    // --- read primitives --------------------------------------------------

    fn split_front(&mut self, n: usize) -> Result<VecDeque<Bytes>, BufferError> {
        self.freeze_write();
        let available = self.len();
        if available < n {
            return Err(BufferError::Underflow {
                needed: n,
                available,
            });
        }
        let mut out = VecDeque::new();
        let mut remaining = n;
        while remaining > 0 {
            let Some(mut seg) = self.segments.pop_front() else {
                break;
            };
            if seg.len() <= remaining {
                remaining -= seg.len();
                out.push_back(seg);
            } else {
                out.push_back(seg.split_to(remaining));
                remaining = 0;
                self.segments.push_front(seg);
            }
        }
        Ok(out)
    }

    fn pop_array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        let segs = self.split_front(N)?;
        let mut out = [0u8; N];
        let mut off = 0;
        for seg in segs {
            out[off..off + seg.len()].copy_from_slice(&seg);
            off += seg.len();
        }
        Ok(out)
    }

    pub fn pop_u32(&mut self) -> Result<u32, BufferError> {
        Ok(u32::from_be_bytes(self.pop_array::<4>()?))
    }

    pub fn pop_u16(&mut self) -> Result<u16, BufferError> {
        Ok(u16::from_be_bytes(self.pop_array::<2>()?))
    }

    pub fn pop_u8(&mut self) -> Result<u8, BufferError> {
        Ok(u8::from_be_bytes(self.pop_array::<1>()?))
    }

    /// Reads exactly `n` raw bytes as a UTF-8 string.
    pub fn pop_string(&mut self, n: usize) -> Result<String, BufferError> {
        let segs = self.split_front(n)?;
        let mut raw = Vec::with_capacity(n);
        for seg in segs {
            raw.extend_from_slice(&seg);
        }
        String::from_utf8(raw).map_err(|e| BufferError::InvalidString {
            valid_up_to: e.utf8_error().valid_up_to(),
        })
    }

    /// Chops the first `n` bytes off into their own buffer, zero-copy.
    pub fn pop_buffer(&mut self, n: usize) -> Result<PayloadBuffer, BufferError> {
        Ok(PayloadBuffer {
            segments: self.split_front(n)?,
            write: None,
            write_capacity: 0,
        })
    }

    /// Chops off everything that is left.
    pub fn pop_rest(&mut self) -> PayloadBuffer {
        let n = self.len();
        // cannot underflow: n == len
        self.pop_buffer(n).unwrap_or_default()
    }

    /// Drops bytes from the back until `new_len` remain. No-op if the buffer
    /// is already short enough.
    pub fn truncate(&mut self, new_len: usize) {
        self.freeze_write();
        let mut excess = self.len().saturating_sub(new_len);
        while excess > 0 {
            let Some(seg) = self.segments.pop_back() else {
                break;
            };
            if seg.len() <= excess {
                excess -= seg.len();
            } else {
                let keep = seg.len() - excess;
                self.segments.push_back(seg.slice(..keep));
                excess = 0;
            }
        }
    }

    // --- headers ----------------------------------------------------------

    /// Prepends a serialized header.
    pub fn push_header<H: Header>(&mut self, header: &H) {
        self.push_front(header.serialize());
    }

    /// Decodes and consumes a header from the front.
    pub fn pop_header<H: Header + Default>(&mut self) -> Result<H, BufferError> {
        let mut header = H::default();
        header.deserialize(self)?;
        Ok(header)
    }

    /// Decodes a header from the front without consuming any bytes. The
    /// decode runs against a throwaway copy of the segment list.
    pub fn peek_header<H: Header + Default>(&mut self) -> Result<H, BufferError> {
        self.freeze_write();
        let mut scratch = PayloadBuffer {
            segments: self.segments.clone(),
            write: None,
            write_capacity: 0,
        };
        let mut header = H::default();
        header.deserialize(&mut scratch)?;
        Ok(header)
    }

    // --- whole-buffer views -----------------------------------------------

    /// Flattens all segments into one contiguous region and returns it.
    /// Needed when a block requires a simple memory view, e.g. checksums.
    pub fn linearize(&mut self) -> Bytes {
        self.freeze_write();
        if self.segments.len() <= 1 {
            return self.segments.front().cloned().unwrap_or_else(Bytes::new);
        }
        let mut flat = BytesMut::with_capacity(self.len());
        for seg in &self.segments {
            flat.extend_from_slice(seg);
        }
        let flat = flat.freeze();
        self.segments.clear();
        self.segments.push_back(flat.clone());
        flat
    }

    /// Copies the entire content out. Diagnostic and test helper.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for seg in &self.segments {
            out.extend_from_slice(seg);
        }
        if let Some(w) = &self.write {
            out.extend_from_slice(w);
        }
        out
    }

    /// Hex dump for logs. With `pretty`, renders 16 bytes per line in
    /// 4-byte groups with an ASCII gutter. At most `max_bytes` are shown.
    pub fn to_hex(&self, pretty: bool, max_bytes: usize) -> String {
        let data = self.to_vec();
        let shown = &data[..data.len().min(max_bytes)];
        if !pretty {
            return hex::encode(shown);
        }
        let mut out = String::new();
        for line in shown.chunks(16) {
            for group in line.chunks(4) {
                out.push_str(&hex::encode(group));
                out.push(' ');
            }
            // pad short last lines so the gutter lines up
            let missing = 16 - line.len();
            for _ in 0..missing * 2 + missing / 4 {
                out.push(' ');
            }
            out.push_str("| ");
            for b in line {
                out.push(if b.is_ascii_graphic() { *b as char } else { '.' });
            }
            out.push('\n');
        }
        if data.len() > max_bytes {
            out.push_str(&format!("... ({} bytes total)\n", data.len()));
        }
        out
    }
}

impl Clone for PayloadBuffer {
    /// Clones share frozen segments (they are immutable) and copy any
    /// pending write region.
    fn clone(&self) -> Self {
        let mut segments = self.segments.clone();
        if let Some(w) = &self.write {
            if !w.is_empty() {
                segments.push_back(Bytes::copy_from_slice(w));
            }
        }
        PayloadBuffer {
            segments,
            write: None,
            write_capacity: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn u32_round_trip() {
        let mut buf = PayloadBuffer::with_capacity(4);
        buf.push_u32(0xdead_beef);
        assert_eq!(buf.pop_u32(), Ok(0xdead_beef));
        assert!(buf.is_empty());
    }

    #[test]
    fn integers_are_big_endian_on_the_wire() {
        let mut buf = PayloadBuffer::with_capacity(7);
        buf.push_u32(0x0102_0304);
        buf.push_u16(0x0506);
        buf.push_u8(0x07);
        assert_eq!(buf.to_vec(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn strings_have_no_framing() {
        let mut buf = PayloadBuffer::with_capacity(5);
        buf.push_string("hello");
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.pop_string(5), Ok("hello".to_string()));
    }

    #[test]
    #[should_panic(expected = "payload buffer overflow")]
    fn overrunning_the_write_region_panics() {
        let mut buf = PayloadBuffer::with_capacity(3);
        buf.push_u32(1);
    }

    #[test]
    fn pop_past_end_reports_underflow() {
        let mut buf = PayloadBuffer::from_slice(&[1, 2]);
        assert_eq!(
            buf.pop_u32(),
            Err(BufferError::Underflow {
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn pops_cross_segment_boundaries() {
        let mut buf = PayloadBuffer::from_slice(&[0x01, 0x02]);
        buf.push_back(PayloadBuffer::from_slice(&[0x03, 0x04]));
        assert_eq!(buf.segment_count(), 2);
        assert_eq!(buf.pop_u32(), Ok(0x0102_0304));
    }

    #[test]
    fn splicing_preserves_order_without_copying() {
        let mut body = PayloadBuffer::from_slice(b"body");
        body.push_front(PayloadBuffer::from_slice(b"head-"));
        body.push_back(PayloadBuffer::from_slice(b"-tail"));
        assert_eq!(body.to_vec(), b"head-body-tail");
    }

    #[test]
    fn truncate_drops_from_the_back() {
        let mut buf = PayloadBuffer::from_slice(b"payload");
        buf.push_back(PayloadBuffer::from_slice(b"-padding"));
        buf.truncate(7);
        assert_eq!(buf.to_vec(), b"payload");
    }

    #[test]
    fn pop_buffer_is_zero_copy_chop() {
        let mut buf = PayloadBuffer::from_slice(b"headerbody");
        let head = buf.pop_buffer(6).unwrap();
        assert_eq!(head.to_vec(), b"header");
        assert_eq!(buf.to_vec(), b"body");
        assert_eq!(buf.pop_rest().to_vec(), b"body");
    }

    #[derive(Debug, Default, PartialEq)]
    struct TestHeader {
        version: u8,
        length: u16,
    }

    impl Header for TestHeader {
        fn serialize(&self) -> PayloadBuffer {
            let mut buf = PayloadBuffer::with_capacity(3);
            buf.push_u8(self.version);
            buf.push_u16(self.length);
            buf
        }

        fn deserialize(&mut self, buf: &mut PayloadBuffer) -> Result<(), BufferError> {
            self.version = buf.pop_u8()?;
            self.length = buf.pop_u16()?;
            Ok(())
        }
    }

    #[test]
    fn header_push_pop_round_trip() {
        let mut buf = PayloadBuffer::from_slice(b"body");
        buf.push_header(&TestHeader {
            version: 2,
            length: 4,
        });
        let header: TestHeader = buf.pop_header().unwrap();
        assert_eq!(
            header,
            TestHeader {
                version: 2,
                length: 4
            }
        );
        assert_eq!(buf.to_vec(), b"body");
    }

    #[test]
    fn peek_header_does_not_consume() {
        let mut buf = PayloadBuffer::from_slice(b"body");
        buf.push_header(&TestHeader {
            version: 9,
            length: 4,
        });
        let before = buf.len();
        let peeked: TestHeader = buf.peek_header().unwrap();
        assert_eq!(peeked.version, 9);
        assert_eq!(buf.len(), before);
        let popped: TestHeader = buf.pop_header().unwrap();
        assert_eq!(popped, peeked);
    }

    #[test]
    fn linearize_flattens_to_one_segment() {
        let mut buf = PayloadBuffer::from_slice(b"ab");
        buf.push_back(PayloadBuffer::from_slice(b"cd"));
        let flat = buf.linearize();
        assert_eq!(&flat[..], b"abcd");
        assert_eq!(buf.segment_count(), 1);
    }

    #[test]
    fn hex_dump_groups_bytes() {
        let buf = PayloadBuffer::from_slice(b"hello world!!!!!x");
        let dump = buf.to_hex(true, 64);
        assert!(dump.contains("68656c6c"));
        assert!(dump.contains("| hello"));
        assert_eq!(buf.to_hex(false, 2), "6865");
    }

    #[test]
    fn clear_resets_everything() {
        let mut buf = PayloadBuffer::with_capacity(8);
        buf.push_u32(1);
        buf.push_back(PayloadBuffer::from_slice(b"xy"));
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.segment_count(), 0);
        assert_eq!(buf.remaining_capacity(), 0);
    }

    proptest! {
        #[test]
        fn prop_u32_round_trip(x: u32) {
            let mut buf = PayloadBuffer::with_capacity(4);
            buf.push_u32(x);
            prop_assert_eq!(buf.pop_u32(), Ok(x));
        }

        #[test]
        fn prop_u16_round_trip(x: u16) {
            let mut buf = PayloadBuffer::with_capacity(2);
            buf.push_u16(x);
            prop_assert_eq!(buf.pop_u16(), Ok(x));
        }

        #[test]
        fn prop_string_round_trip(s in "[a-zA-Z0-9 ]{0,64}") {
            let mut buf = PayloadBuffer::with_capacity(s.len());
            buf.push_string(&s);
            prop_assert_eq!(buf.pop_string(s.len()), Ok(s));
        }

        #[test]
        fn prop_mixed_sequence_round_trips(a: u32, b: u16, c: u8, tail in proptest::collection::vec(any::<u8>(), 0..32)) {
            let mut buf = PayloadBuffer::with_capacity(7 + tail.len());
            buf.push_u32(a);
            buf.push_u16(b);
            buf.push_u8(c);
            buf.push_bytes(&tail);
            prop_assert_eq!(buf.pop_u32(), Ok(a));
            prop_assert_eq!(buf.pop_u16(), Ok(b));
            prop_assert_eq!(buf.pop_u8(), Ok(c));
            prop_assert_eq!(buf.pop_rest().to_vec(), tail);
        }
    }
}
