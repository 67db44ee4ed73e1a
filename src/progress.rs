//! Progress & summary (C6).
//!
//! Counters are plain, non-atomic fields updated from the single parser
//! thread; parallel-mode worker counts live in [`crate::parallel`] instead,
//! since those are genuinely shared across threads.

use std::io::Write;
use std::time::Instant;

pub struct RunStats {
    pub bytes_read: u64,
    pub elements: u64,
    pub current_chunk_index: u32,
    pub current_chunk_records: u64,
    started: Instant,
    last_report: Instant,
}

impl RunStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            bytes_read: 0,
            elements: 0,
            current_chunk_index: 1,
            current_chunk_records: 0,
            started: now,
            last_report: now,
        }
    }

    /// Emit a rate line at most once per wall-clock second. No-op unless
    /// `verbose`.
    pub fn maybe_report(&mut self, verbose: bool, err: &mut impl Write) {
        if !verbose {
            return;
        }
        let now = Instant::now();
        if now.duration_since(self.last_report).as_secs() < 1 {
            return;
        }
        self.last_report = now;
        let elapsed = now.duration_since(self.started).as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.elements as f64 / elapsed
        } else {
            0.0
        };
        let _ = writeln!(
            err,
            "jxtract: {} bytes read, {} elements, chunk {} ({} records), {:.0} elem/s",
            self.bytes_read,
            self.elements,
            self.current_chunk_index,
            self.current_chunk_records,
            rate
        );
        tracing::debug!(
            bytes_read = self.bytes_read,
            elements = self.elements,
            chunk = self.current_chunk_index,
            rate,
            "progress"
        );
    }

    /// Final end-of-run summary. Always emitted on a successful run,
    /// independent of `verbose`.
    pub fn summary(&self, err: &mut impl Write, chunks: &[(String, u64)]) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let elem_per_sec = if elapsed > 0.0 {
            self.elements as f64 / elapsed
        } else {
            0.0
        };
        let mb_per_sec = if elapsed > 0.0 {
            (self.bytes_read as f64 / (1024.0 * 1024.0)) / elapsed
        } else {
            0.0
        };
        let _ = writeln!(
            err,
            "jxtract: done — {} elements, {} bytes read, {:.2}s elapsed, {:.0} elem/s, {:.1} MB/s",
            self.elements, self.bytes_read, elapsed, elem_per_sec, mb_per_sec
        );
        if !chunks.is_empty() {
            for (path, records) in chunks {
                let _ = writeln!(err, "  {path}: {records} records");
            }
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}
