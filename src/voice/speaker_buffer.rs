//! Playback accumulation buffer with index cursors

use crate::{Error, Result};

/// Fixed-capacity byte buffer between the transport and the playback sink
///
/// `index` is the write cursor and `size` the number of valid bytes waiting
/// for the sink. `0 <= size <= index <= capacity` holds after every operation.
pub struct PlaybackBuffer {
    data: Vec<u8>,
    size: usize,
    index: usize,
}

impl PlaybackBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes
    ///
    /// # Errors
    ///
    /// Returns error if the allocation fails
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|e| Error::Setup(format!("could not allocate speaker buffer: {e}")))?;
        data.resize(capacity, 0);

        Ok(Self {
            data,
            size: 0,
            index: 0,
        })
    }

    /// Writable region of exactly `len` bytes at the write cursor
    ///
    /// Returns `None` when fewer than `len` bytes remain, so a receive never
    /// lands partially.
    pub fn write_slot(&mut self, len: usize) -> Option<&mut [u8]> {
        let end = self.index.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        Some(&mut self.data[self.index..end])
    }

    /// Mark `len` bytes written at the cursor as valid
    pub fn commit(&mut self, len: usize) {
        let len = len.min(self.data.len() - self.index);
        self.index += len;
        self.size += len;
    }

    /// Bytes waiting to be played
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Drop `written` played bytes, shifting the remainder to offset 0
    pub fn consume(&mut self, written: usize) {
        let written = written.min(self.size);
        if written == 0 {
            return;
        }
        self.data.copy_within(written..self.size, 0);
        self.size -= written;
        self.index -= written;
    }

    /// Zero the contents and rewind both cursors
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.size = 0;
        self.index = 0;
    }

    /// Valid bytes waiting for the sink
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Write cursor position
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Total capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}
