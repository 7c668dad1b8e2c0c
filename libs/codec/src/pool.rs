//! Bounded buffer pool
//!
//! Traffic sources that allocate one buffer per packet recycle allocations
//! through a [`BufferPool`]: a bounded free-list of write regions of one
//! fixed capacity. Released buffers are fully reset before reuse.
//!
//! The pool itself is not synchronized; owners that share one across
//! threads wrap it in a mutex.

use bytes::BytesMut;
use tracing::trace;

use crate::buffer::PayloadBuffer;

/// Bounded free-list of fixed-capacity payload buffers.
#[derive(Debug)]
pub struct BufferPool {
    buffer_capacity: usize,
    free: Vec<BytesMut>,
    max_buffers: usize,
}

impl BufferPool {
    pub fn new(buffer_capacity: usize, max_buffers: usize) -> Self {
        BufferPool {
            buffer_capacity,
            free: Vec::with_capacity(max_buffers),
            max_buffers,
        }
    }

    /// Hands out a writable buffer of the pool's capacity, reusing a
    /// recycled allocation when one is available.
    pub fn acquire(&mut self) -> PayloadBuffer {
        match self.free.pop() {
            Some(mut region) => {
                region.clear();
                region.reserve(self.buffer_capacity);
                PayloadBuffer::from_writable(region, self.buffer_capacity)
            }
            None => PayloadBuffer::with_capacity(self.buffer_capacity),
        }
    }

    /// Returns a buffer to the pool. Only the writable allocation is
    /// reclaimable; buffers that were frozen or spliced are simply dropped,
    /// as is anything beyond the pool bound.
    pub fn release(&mut self, buffer: PayloadBuffer) {
        if self.free.len() >= self.max_buffers {
            trace!(max = self.max_buffers, "buffer pool full, dropping buffer");
            return;
        }
        if let Some(region) = buffer.into_writable() {
            self.free.push(region);
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_buffers_are_reset_before_reuse() {
        let mut pool = BufferPool::new(16, 4);
        let mut buf = pool.acquire();
        buf.push_u32(0xffff_ffff);
        pool.release(buf);
        assert_eq!(pool.available(), 1);

        let reused = pool.acquire();
        assert!(reused.is_empty());
        assert_eq!(reused.remaining_capacity(), 16);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn pool_bound_is_respected() {
        let mut pool = BufferPool::new(8, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn frozen_buffers_are_not_recycled() {
        let mut pool = BufferPool::new(8, 4);
        let mut buf = pool.acquire();
        buf.push_u32(1);
        let _ = buf.pop_u32();
        pool.release(buf);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn exhausted_pool_still_allocates() {
        let mut pool = BufferPool::new(8, 2);
        let buf = pool.acquire();
        assert_eq!(buf.remaining_capacity(), 8);
    }
}
