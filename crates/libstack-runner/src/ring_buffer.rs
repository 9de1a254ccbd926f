//! Ring buffer implementation for bounded output capture
//!
//! Long-running build tools (`mvn`, `ant`, frontend builds) can emit megabytes of
//! output. Only the tail is useful for diagnosing a failed step, so capture is
//! bounded and old bytes are dropped from the front.

use std::collections::VecDeque;
use std::fmt;

/// A ring buffer that maintains a fixed maximum size
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: VecDeque<u8>,
    max_bytes: usize,
    total_bytes_written: usize,
}

impl RingBuffer {
    /// Create a new ring buffer with the specified maximum size
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(max_bytes.min(8192)),
            max_bytes,
            total_bytes_written: 0,
        }
    }

    /// Write data to the ring buffer
    ///
    /// If the buffer would exceed `max_bytes`, old data is dropped from the front.
    pub fn write(&mut self, data: &[u8]) {
        self.total_bytes_written += data.len();
        if self.max_bytes == 0 {
            return;
        }

        // Only the last max_bytes of a large chunk can survive.
        let data = if data.len() > self.max_bytes {
            &data[data.len() - self.max_bytes..]
        } else {
            data
        };

        let overflow = (self.buffer.len() + data.len()).saturating_sub(self.max_bytes);
        self.buffer.drain(..overflow);
        self.buffer.extend(data.iter().copied());
    }

    /// Get the current size of the buffer in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the total number of bytes written (including truncated bytes)
    #[must_use]
    pub const fn total_bytes_written(&self) -> usize {
        self.total_bytes_written
    }

    /// Check if any data was truncated
    #[must_use]
    pub const fn was_truncated(&self) -> bool {
        self.total_bytes_written > self.max_bytes
    }

    /// Consume the buffer, returning the retained bytes in order.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.into_iter().collect()
    }
}

impl fmt::Display for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (front, back) = self.buffer.as_slices();
        let mut bytes = Vec::with_capacity(self.buffer.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        write!(f, "{}", String::from_utf8_lossy(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_basic() {
        let mut buffer = RingBuffer::new(10);
        buffer.write(b"hello");
        assert_eq!(buffer.to_string(), "hello");
        assert_eq!(buffer.len(), 5);
        assert!(!buffer.was_truncated());
    }

    #[test]
    fn test_ring_buffer_truncation_keeps_tail() {
        let mut buffer = RingBuffer::new(10);
        buffer.write(b"hello");
        buffer.write(b" world!");
        assert_eq!(buffer.to_string(), "llo world!");
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.total_bytes_written(), 12);
        assert!(buffer.was_truncated());
    }

    #[test]
    fn test_ring_buffer_single_large_write() {
        let mut buffer = RingBuffer::new(4);
        buffer.write(b"BUILD FAILURE");
        assert_eq!(buffer.to_string(), "LURE");
        assert_eq!(buffer.into_bytes(), b"LURE".to_vec());
    }

    #[test]
    fn test_ring_buffer_zero_capacity() {
        let mut buffer = RingBuffer::new(0);
        buffer.write(b"discarded");
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes_written(), 9);
    }
}
