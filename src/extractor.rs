//! Single-worker extraction pipeline: Input stream → C1 → C2 → C3 → C4.
//!
//! Parallel mode (C5) reuses C1–C3 through [`ElementFeed`] but routes
//! elements to the work queue instead of calling [`OutputRouter`] directly;
//! see [`crate::parallel`].

use std::io::{Read, Write};

use crate::buffer::ByteBuffer;
use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::locator;
use crate::output::OutputRouter;
use crate::progress::RunStats;
use crate::scanner::ElementScanner;

/// Locate the target array and hand back a scanner positioned to pull
/// elements one at a time. Shared by the sequential and parallel paths.
pub struct ElementFeed<R: Read> {
    buf: ByteBuffer<R>,
}

impl<R: Read> ElementFeed<R> {
    pub fn open(reader: R, buffer_size: usize, key: &str, source_name: &str) -> Result<Self> {
        let mut buf = ByteBuffer::new(reader, buffer_size, source_name);
        locator::locate(&mut buf, key)?;
        Ok(Self { buf })
    }

    pub fn scanner(&mut self) -> ElementScanner<'_, R> {
        ElementScanner::new(&mut self.buf)
    }

    pub fn bytes_read(&self) -> u64 {
        self.buf.total_read
    }
}

/// Run the sequential pipeline end to end: locate, scan, route, report.
/// Returns the total number of elements emitted.
pub fn run_sequential<R: Read>(
    reader: R,
    config: &ExtractorConfig,
    source_name: &str,
    err: &mut impl Write,
) -> Result<u64> {
    let mut feed = ElementFeed::open(reader, config.buffer_size, &config.key, source_name)?;
    let mut router = OutputRouter::new(
        config.output.clone(),
        config.mode,
        config.resolve_newline_flatten(),
    )?;
    let mut stats = RunStats::new();

    let mut scanner = feed.scanner();
    loop {
        let Some(elem) = scanner.next_element()? else {
            break;
        };
        router.write_element(&elem)?;
        stats.elements += 1;
        stats.bytes_read = scanner.bytes_read();
        stats.current_chunk_index = router.current_chunk_index();
        stats.current_chunk_records = router.current_chunk_records();
        stats.maybe_report(config.verbose, err);
    }
    drop(scanner);

    router.finalize()?;
    stats.bytes_read = feed.bytes_read();
    stats.summary(err, &router.completed_chunks);
    Ok(stats.elements)
}
