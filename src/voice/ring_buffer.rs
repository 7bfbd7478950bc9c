//! Fixed-capacity capture buffer with a drop-oldest overflow policy

use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer};

use crate::{Error, Result};

/// Ring buffer decoupling microphone read cadence from datagram send cadence
///
/// Writes never fail: when a write does not fit, the oldest items equal to the
/// overflow are discarded first.
pub struct RingBuffer<T> {
    inner: HeapRb<T>,
    capacity: usize,
}

impl<T: Copy> RingBuffer<T> {
    /// Allocate a ring buffer holding `capacity` items
    ///
    /// # Errors
    ///
    /// Returns error if the capacity is zero or the allocation fails
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Setup("ring buffer capacity must be non-zero".to_string()));
        }

        let inner = HeapRb::try_new(capacity)
            .map_err(|e| Error::Setup(format!("could not allocate ring buffer: {e}")))?;

        Ok(Self { inner, capacity })
    }

    /// Append items, dropping the oldest buffered items if they do not fit
    ///
    /// Returns the number of items appended
    pub fn write(&mut self, data: &[T]) -> usize {
        // Only the newest `capacity` items can survive
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };

        let vacant = self.inner.vacant_len();
        if vacant < data.len() {
            let dropped = self.inner.skip(data.len() - vacant);
            tracing::trace!(dropped, "ring buffer overflow");
        }

        self.inner.push_slice(data)
    }

    /// Move up to `out.len()` of the oldest items into `out`
    ///
    /// Returns the number of items read
    pub fn read(&mut self, out: &mut [T]) -> usize {
        self.inner.pop_slice(out)
    }

    /// Number of items currently buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Total capacity in items
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard everything buffered
    pub fn reset(&mut self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(RingBuffer::<i16>::with_capacity(0).is_err());
    }

    #[test]
    fn write_within_capacity_keeps_everything() {
        let mut rb = RingBuffer::<i16>::with_capacity(8).unwrap();
        assert_eq!(rb.write(&[1, 2, 3]), 3);
        assert_eq!(rb.len(), 3);

        let mut out = [0i16; 3];
        assert_eq!(rb.read(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert!(rb.is_empty());
    }

    #[test]
    fn overflow_drops_exactly_the_oldest_excess() {
        let mut rb = RingBuffer::<i16>::with_capacity(5).unwrap();
        rb.write(&[1, 2, 3, 4]);

        // Two vacant slots, three incoming: exactly one oldest item goes
        rb.write(&[5, 6, 7]);
        assert_eq!(rb.len(), 5);

        let mut out = [0i16; 5];
        rb.read(&mut out);
        assert_eq!(out, [2, 3, 4, 5, 6]);
    }

    #[test]
    fn oversized_write_keeps_newest_tail() {
        let mut rb = RingBuffer::<i16>::with_capacity(4).unwrap();
        rb.write(&[9, 9]);
        rb.write(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(rb.len(), rb.capacity());

        let mut out = [0i16; 4];
        rb.read(&mut out);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn partial_read_leaves_remainder() {
        let mut rb = RingBuffer::<i16>::with_capacity(8).unwrap();
        rb.write(&[1, 2, 3, 4, 5]);

        let mut out = [0i16; 2];
        assert_eq!(rb.read(&mut out), 2);
        assert_eq!(rb.len(), 3);
    }

    #[test]
    fn reset_empties_buffer() {
        let mut rb = RingBuffer::<i16>::with_capacity(4).unwrap();
        rb.write(&[1, 2, 3]);
        rb.reset();
        assert!(rb.is_empty());
    }
}
