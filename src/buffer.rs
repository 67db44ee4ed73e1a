//! Byte buffer / refill (C1).
//!
//! Holds a sliding window over an arbitrary [`Read`] source. The only
//! subtle invariant: while an element is being accumulated
//! (`element_start = Some(s)`), the bytes `[s, pos)` must survive a
//! refill. `refill()` shifts them to the front of the buffer instead of
//! discarding them.

use std::io::Read;

use crate::error::{ExtractError, Result};

pub struct ByteBuffer<R: Read> {
    reader: R,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    element_start: Option<usize>,
    buffer_size: usize,
    /// Total bytes ever read from `reader`, for progress reporting.
    pub total_read: u64,
    path_for_errors: String,
}

impl<R: Read> ByteBuffer<R> {
    pub fn new(reader: R, buffer_size: usize, path_for_errors: impl Into<String>) -> Self {
        Self {
            reader,
            buf: vec![0u8; buffer_size],
            pos: 0,
            len: 0,
            element_start: None,
            buffer_size,
            total_read: 0,
            path_for_errors: path_for_errors.into(),
        }
    }

    /// Mark that an element starts at the current cursor. Bytes from this
    /// point on survive refills until [`clear_element_start`] is called.
    pub fn set_element_start(&mut self) {
        self.element_start = Some(self.pos);
    }

    pub fn clear_element_start(&mut self) {
        self.element_start = None;
    }

    pub fn element_start(&self) -> Option<usize> {
        self.element_start
    }

    /// Current cursor position in the live buffer.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Byte slice of the buffer currently valid for reading, `[pos, len)`.
    fn live(&self) -> &[u8] {
        &self.buf[self.pos..self.len]
    }

    /// The verbatim bytes of the in-progress element, `[element_start, pos)`.
    /// Valid until the next call that may refill.
    pub fn element_slice(&self, start: usize) -> &[u8] {
        &self.buf[start..self.pos]
    }

    /// Ensure at least one byte is available at `pos`, refilling if
    /// necessary. Returns `Ok(true)` if a byte is available, `Ok(false)` at
    /// EOF.
    pub fn ensure_byte(&mut self) -> Result<bool> {
        if self.pos < self.len {
            return Ok(true);
        }
        self.refill()
    }

    /// Peek the byte at the cursor without consuming it. Caller must have
    /// called `ensure_byte` first.
    pub fn peek(&self) -> u8 {
        self.buf[self.pos]
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }

    /// Issue a single read of up to `buffer_size` bytes, preserving any
    /// in-progress element suffix. Returns `Ok(false)` at EOF (after all
    /// preserved bytes, if any, have been exhausted and no more data
    /// arrives).
    fn refill(&mut self) -> Result<bool> {
        tracing::trace!(
            pos = self.pos,
            len = self.len,
            element_start = ?self.element_start,
            "refilling byte buffer"
        );
        match self.element_start {
            Some(start) => {
                let preserved = self.len - start;
                self.buf.copy_within(start..self.len, 0);
                self.pos -= start;
                self.len = preserved;
                self.element_start = Some(0);
            }
            None => {
                self.pos = 0;
                self.len = 0;
            }
        }

        // Grow the buffer if a single in-progress element already fills it,
        // so elements longer than buffer_size still work.
        if self.len == self.buf.len() {
            self.buf.resize(self.buf.len() + self.buffer_size, 0);
        }

        let n = self
            .reader
            .read(&mut self.buf[self.len..])
            .map_err(|e| ExtractError::io(self.path_for_errors.clone(), e))?;
        if n == 0 {
            return Ok(!self.live().is_empty());
        }
        self.total_read += n as u64;
        self.len += n;
        Ok(true)
    }
}
