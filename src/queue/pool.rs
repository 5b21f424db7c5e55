//! Reusable byte buffers for queued frames
//!
//! Each [`FrameQueue`](super::FrameQueue) owns one pool. Buffers handed out
//! by [`BufferPool::acquire_copy`] keep their capacity when they come back
//! through [`BufferPool::release`], so steady-state streaming does not touch
//! the allocator.

/// Bounded stack of spare frame buffers
#[derive(Debug)]
pub struct BufferPool {
    buffers: Vec<Vec<u8>>,
    max_size: usize,
    hits: u64,
    misses: u64,
}

impl BufferPool {
    /// Create an empty pool holding at most `max_size` spare buffers
    pub fn new(max_size: usize) -> Self {
        Self {
            buffers: Vec::with_capacity(max_size),
            max_size,
            hits: 0,
            misses: 0,
        }
    }

    /// Fill the pool with up to `count` zeroed buffers of `len` bytes
    pub fn preallocate(&mut self, count: usize, len: usize) {
        let count = count.min(self.max_size);
        while self.buffers.len() < count {
            self.buffers.push(vec![0u8; len]);
        }
    }

    /// Copy `src` into a pooled buffer, allocating only when the pool is empty
    pub fn acquire_copy(&mut self, src: &[u8]) -> Vec<u8> {
        match self.buffers.pop() {
            Some(mut buf) => {
                self.hits += 1;
                buf.clear();
                buf.extend_from_slice(src);
                buf
            }
            None => {
                self.misses += 1;
                src.to_vec()
            }
        }
    }

    /// Return a buffer; dropped if the pool is already full
    pub fn release(&mut self, buf: Vec<u8>) {
        if self.buffers.len() < self.max_size {
            self.buffers.push(buf);
        }
    }

    /// Number of spare buffers currently held
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn reset_counters(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_from_empty_pool_allocates() {
        let mut pool = BufferPool::new(2);
        let buf = pool.acquire_copy(&[1, 2, 3]);
        assert_eq!(buf, vec![1, 2, 3]);
        assert_eq!(pool.misses(), 1);
        assert_eq!(pool.hits(), 0);
    }

    #[test]
    fn test_released_buffer_is_reused() {
        let mut pool = BufferPool::new(2);
        let buf = vec![9u8; 6];
        let ptr = buf.as_ptr();
        pool.release(buf);
        let reused = pool.acquire_copy(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(reused.as_ptr(), ptr);
        assert_eq!(reused, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(pool.hits(), 1);
    }

    #[test]
    fn test_pool_is_bounded() {
        let mut pool = BufferPool::new(1);
        pool.release(vec![0; 3]);
        pool.release(vec![0; 3]);
        assert_eq!(pool.len(), 1);
        pool.preallocate(5, 3);
        assert_eq!(pool.len(), 1);
    }
}
