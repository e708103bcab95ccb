//! Bounded circular byte store for recent PTY output.
//!
//! The ring always holds the most recent `capacity` bytes written through it,
//! so a newly connected client can be replayed a scrollback snapshot without
//! the holder keeping unbounded history. All storage is allocated at
//! construction; writes never allocate.

/// A fixed-capacity circular byte buffer.
#[derive(Debug)]
pub struct Ring {
    buf: Vec<u8>,
    /// Next write position (wraps around).
    head: usize,
    /// Total bytes ever written (used to detect wrap).
    total_written: u64,
}

impl Ring {
    /// Create a ring with the given capacity in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        Self {
            buf: vec![0u8; capacity],
            head: 0,
            total_written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Append `data`, overwriting the oldest bytes once full.
    ///
    /// A write at least as large as the capacity keeps only its trailing
    /// `capacity` bytes and resets the head, since everything previously
    /// stored would be overwritten anyway.
    pub fn write(&mut self, data: &[u8]) {
        let cap = self.buf.len();
        if data.is_empty() {
            return;
        }
        if data.len() >= cap {
            self.buf.copy_from_slice(&data[data.len() - cap..]);
            self.head = 0;
            self.total_written += data.len() as u64;
            return;
        }

        let first = (cap - self.head).min(data.len());
        self.buf[self.head..self.head + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.buf[..rest].copy_from_slice(&data[first..]);
        }
        self.head = (self.head + data.len()) % cap;
        self.total_written += data.len() as u64;
    }

    /// Copy out the buffered bytes in chronological order.
    ///
    /// The returned vector is owned and does not alias the ring's storage;
    /// callers may retain it across further writes.
    pub fn read(&self) -> Vec<u8> {
        let len = self.len();
        let mut out = Vec::with_capacity(len);
        if self.total_written <= self.buf.len() as u64 {
            // Not wrapped yet: data starts at 0.
            out.extend_from_slice(&self.buf[..len]);
        } else {
            // Wrapped: oldest byte lives at head.
            out.extend_from_slice(&self.buf[self.head..]);
            out.extend_from_slice(&self.buf[..self.head]);
        }
        out
    }

    /// Number of valid bytes currently stored: `min(total_written, capacity)`.
    pub fn len(&self) -> usize {
        let cap = self.buf.len() as u64;
        self.total_written.min(cap) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total_written == 0
    }

    /// Total bytes ever written through this ring.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Logical reset: size and total-written return to zero. Capacity is
    /// unchanged.
    pub fn clear(&mut self) {
        self.head = 0;
        self.total_written = 0;
    }
}
