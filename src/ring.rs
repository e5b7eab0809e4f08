//! Fixed-capacity byte ring backing each data pipe.
//!
//! A `pos`/`len`/`cap` cursor triple with wraparound reads and writes,
//! and reader/writer views that expose the *contiguous* span available
//! without wrapping — exactly what `BeginWriteData`/`BeginReadData` need
//! for a zero-copy two-phase range. Cursor arithmetic over a plain
//! `Vec<u8>`, so there is no unsafe code here at all.

/// A fixed-capacity circular byte buffer.
///
/// `len` is always the number of readable bytes; `cap - len` is always
/// the number of writable bytes. Capacity never changes after
/// construction.
#[derive(Debug)]
pub struct RingBuffer {
    data: Vec<u8>,
    cap: usize,
    pos: usize,
    len: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> RingBuffer {
        RingBuffer {
            data: vec![0u8; capacity],
            cap: capacity,
            pos: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.cap - self.len
    }

    /// Copies `src` into the ring and advances the write cursor.
    /// Caller must ensure `src.len() <= self.free()`.
    pub fn write(&mut self, src: &[u8]) {
        assert!(src.len() <= self.free(), "ring buffer overflow");
        let mut write_at = (self.pos + self.len) % self.cap;
        let mut remaining = src;
        while !remaining.is_empty() {
            let chunk = std::cmp::min(remaining.len(), self.cap - write_at);
            self.data[write_at..write_at + chunk].copy_from_slice(&remaining[..chunk]);
            remaining = &remaining[chunk..];
            write_at = (write_at + chunk) % self.cap;
        }
        self.len += src.len();
    }

    /// Copies up to `dst.len()` readable bytes into `dst` without
    /// advancing the read cursor (a peek). Returns the number copied.
    pub fn peek_into(&self, dst: &mut [u8]) -> usize {
        let n = std::cmp::min(dst.len(), self.len);
        let mut read_at = self.pos;
        let mut written = 0;
        while written < n {
            let chunk = std::cmp::min(n - written, self.cap - read_at);
            dst[written..written + chunk].copy_from_slice(&self.data[read_at..read_at + chunk]);
            written += chunk;
            read_at = (read_at + chunk) % self.cap;
        }
        n
    }

    /// Advances the read cursor by `n` bytes, discarding them.
    /// Caller must ensure `n <= self.len()`.
    pub fn advance_read(&mut self, n: usize) {
        assert!(n <= self.len, "ring buffer underflow");
        self.pos = (self.pos + n) % self.cap;
        self.len -= n;
    }

    /// Copies up to `dst.len()` bytes out and advances the read cursor
    /// by the number copied. Returns the number copied.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let n = self.peek_into(dst);
        self.advance_read(n);
        n
    }

    /// The largest contiguous writable span starting at the write cursor,
    /// without wrapping — what a two-phase `BeginWriteData` can hand back
    /// as a single slice.
    pub fn contiguous_free_len(&self) -> usize {
        if self.free() == 0 {
            return 0;
        }
        let write_at = (self.pos + self.len) % self.cap;
        std::cmp::min(self.free(), self.cap - write_at)
    }

    /// A mutable view of the contiguous writable span at the write
    /// cursor. The caller commits bytes actually produced via
    /// [`RingBuffer::commit_write`].
    pub fn contiguous_free_mut(&mut self) -> &mut [u8] {
        let write_at = (self.pos + self.len) % self.cap;
        let n = self.contiguous_free_len();
        &mut self.data[write_at..write_at + n]
    }

    /// Advances the write cursor by `n` bytes already placed into the
    /// slice returned by [`RingBuffer::contiguous_free_mut`].
    pub fn commit_write(&mut self, n: usize) {
        assert!(n <= self.contiguous_free_len());
        self.len += n;
    }

    /// The largest contiguous readable span starting at the read cursor,
    /// without wrapping — what a two-phase `BeginReadData` can hand back.
    pub fn contiguous_readable_len(&self) -> usize {
        if self.len == 0 {
            return 0;
        }
        std::cmp::min(self.len, self.cap - self.pos)
    }

    /// A read-only view of the contiguous readable span at the read
    /// cursor.
    pub fn contiguous_readable(&self) -> &[u8] {
        let n = self.contiguous_readable_len();
        &self.data[self.pos..self.pos + n]
    }
}
