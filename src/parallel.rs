//! Parallel writer (C5).
//!
//! Active only in NDJSON mode with `workers > 1`. One parser thread runs
//! C1–C3 and assigns a monotonically increasing `seq` to each element; a
//! bounded queue feeds K worker threads, each of which owns its own
//! per-chunk temp files exclusively. After the parser hits EOF and all
//! workers have drained the queue, a single-threaded merge pass
//! concatenates each chunk's worker temp files (`w01, w02, …, wK`, in that
//! order) into the final chunk file.
//!
//! Ordering note: within one worker, elements keep document order; across
//! workers sharing a chunk, the merge order is worker-id ascending, which
//! is *not* the same as strict seq order. A caller that needs strict
//! ordering should pass `workers=1`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::{ExtractorConfig, OutputMode, OutputSpec};
use crate::error::{ExtractError, Result};
use crate::extractor::ElementFeed;
use crate::output::{flatten_newlines, shard_path};
use crate::progress::RunStats;

const QUEUE_CAPACITY: usize = 1024;
/// Cap on simultaneously open temp file handles per worker; beyond this the
/// least-recently-used handle is closed and reopened (append) on next use.
const WORKER_HANDLE_LRU_CAP: usize = 8;

struct QueueItem {
    seq: u64,
    bytes: Box<[u8]>,
}

enum WorkItem {
    Element(QueueItem),
    Shutdown,
}

/// Per-run temp directory lifecycle (C9).
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn create(base: &Path) -> Result<Self> {
        let suffix = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        );
        let path = base.join(format!(".jxtract-{suffix}"));
        std::fs::create_dir_all(&path).map_err(|e| ExtractError::io(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cleanup(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "temp directory left on disk");
            }
        }
    }
}

fn safe_prefix(config: &ExtractorConfig) -> String {
    match &config.output {
        OutputSpec::Sharded { prefix, .. } => prefix
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jxtract".to_string()),
        _ => "jxtract".to_string(),
    }
}

fn temp_file_path(tmp: &Path, safe_prefix: &str, chunk: u32, worker_id: usize) -> PathBuf {
    tmp.join(format!("{safe_prefix}_{chunk:05}_w{worker_id:02}.ndtmp"))
}

/// Small fixed-capacity LRU of open append-mode file handles, keyed by
/// chunk index. Keeps a worker from running out of file descriptors when a
/// run has many chunks.
struct HandleLru {
    handles: HashMap<u32, BufWriter<File>>,
    order: Vec<u32>,
    cap: usize,
}

impl HandleLru {
    fn new(cap: usize) -> Self {
        Self {
            handles: HashMap::new(),
            order: Vec::new(),
            cap,
        }
    }

    fn get_or_open(&mut self, chunk: u32, path: &Path) -> std::io::Result<&mut BufWriter<File>> {
        if !self.handles.contains_key(&chunk) {
            if self.handles.len() >= self.cap {
                if let Some(evict) = self.order.first().copied() {
                    self.order.remove(0);
                    if let Some(mut h) = self.handles.remove(&evict) {
                        h.flush()?;
                    }
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            self.handles.insert(chunk, BufWriter::new(file));
        }
        self.order.retain(|&c| c != chunk);
        self.order.push(chunk);
        Ok(self.handles.get_mut(&chunk).unwrap())
    }

    fn flush_all(&mut self) -> std::io::Result<()> {
        for h in self.handles.values_mut() {
            h.flush()?;
        }
        Ok(())
    }
}

struct WorkerOutcome {
    chunk_counts: HashMap<u32, u64>,
    error: Option<std::io::Error>,
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<Receiver<WorkItem>>>,
    tmp_dir: PathBuf,
    safe_prefix: String,
    split_lines: Option<u64>,
    newline_flatten: bool,
) -> WorkerOutcome {
    let mut handles = HandleLru::new(WORKER_HANDLE_LRU_CAP);
    let mut chunk_counts = HashMap::new();

    loop {
        let item = {
            let guard = rx.lock().unwrap();
            guard.recv()
        };
        let item = match item {
            Ok(item) => item,
            Err(_) => break,
        };
        let queue_item = match item {
            WorkItem::Shutdown => break,
            WorkItem::Element(qi) => qi,
        };

        let chunk = match split_lines {
            Some(s) => queue_item.seq.div_ceil(s) as u32,
            None => 1,
        };
        let path = temp_file_path(&tmp_dir, &safe_prefix, chunk, worker_id);

        let result = (|| -> std::io::Result<()> {
            let writer = handles.get_or_open(chunk, &path)?;
            let line: Vec<u8> = if newline_flatten {
                flatten_newlines(&queue_item.bytes)
            } else {
                queue_item.bytes.to_vec()
            };
            writer.write_all(&line)?;
            writer.write_all(b"\n")
        })();

        match result {
            Ok(()) => {
                *chunk_counts.entry(chunk).or_insert(0u64) += 1;
            }
            Err(e) => {
                return WorkerOutcome {
                    chunk_counts,
                    error: Some(e),
                };
            }
        }
    }

    if let Err(e) = handles.flush_all() {
        return WorkerOutcome {
            chunk_counts,
            error: Some(e),
        };
    }
    WorkerOutcome {
        chunk_counts,
        error: None,
    }
}

/// Merge worker temp files for every chunk (ascending chunk index, then
/// ascending worker id) into the final output, then unlink the temp files.
/// Single-threaded: runs after every worker has joined.
fn merge_chunks(
    config: &ExtractorConfig,
    tmp_dir: &Path,
    safe_prefix: &str,
    workers: usize,
    per_worker_counts: &[HashMap<u32, u64>],
) -> Result<Vec<(String, u64)>> {
    let mut all_chunks: Vec<u32> = per_worker_counts
        .iter()
        .flat_map(|m| m.keys().copied())
        .collect();
    all_chunks.sort_unstable();
    all_chunks.dedup();

    let mut completed = Vec::new();

    for chunk in all_chunks {
        let total: u64 = per_worker_counts
            .iter()
            .map(|m| m.get(&chunk).copied().unwrap_or(0))
            .sum();
        if total == 0 {
            continue;
        }

        let label = match final_chunk_path(config, chunk) {
            Some(final_path) => {
                let mut out =
                    File::create(&final_path).map_err(|e| ExtractError::io(&final_path, e))?;
                for worker_id in 0..workers {
                    let temp_path = temp_file_path(tmp_dir, safe_prefix, chunk, worker_id);
                    if !temp_path.exists() {
                        continue;
                    }
                    let mut input =
                        File::open(&temp_path).map_err(|e| ExtractError::io(&temp_path, e))?;
                    std::io::copy(&mut input, &mut out)
                        .map_err(|e| ExtractError::io(&final_path, e))?;
                    std::fs::remove_file(&temp_path).map_err(|e| ExtractError::io(&temp_path, e))?;
                }
                final_path.display().to_string()
            }
            None => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                for worker_id in 0..workers {
                    let temp_path = temp_file_path(tmp_dir, safe_prefix, chunk, worker_id);
                    if !temp_path.exists() {
                        continue;
                    }
                    let mut input =
                        File::open(&temp_path).map_err(|e| ExtractError::io(&temp_path, e))?;
                    std::io::copy(&mut input, &mut out)
                        .map_err(|e| ExtractError::io("<stdout>", e))?;
                    std::fs::remove_file(&temp_path).map_err(|e| ExtractError::io(&temp_path, e))?;
                }
                "<stdout>".to_string()
            }
        };
        completed.push((label, total));
    }

    Ok(completed)
}

/// `None` means the chunk's content belongs on stdout.
fn final_chunk_path(config: &ExtractorConfig, chunk: u32) -> Option<PathBuf> {
    match &config.output {
        OutputSpec::Sharded { prefix, .. } => Some(shard_path(prefix, chunk, config.mode)),
        OutputSpec::SingleFile(path) => Some(path.clone()),
        OutputSpec::Stdout => None,
    }
}

/// Run the parallel NDJSON pipeline. Strict document order is NOT
/// guaranteed across workers — callers with `workers <= 1` should use
/// [`crate::extractor::run_sequential`] instead.
pub fn run_parallel<R: Read>(
    reader: R,
    config: &ExtractorConfig,
    source_name: &str,
    err: &mut impl Write,
) -> Result<u64> {
    assert!(config.workers > 1, "run_parallel requires workers > 1");
    assert_eq!(config.mode, OutputMode::Ndjson, "parallel mode is NDJSON-only");

    let temp_dir = TempDir::create(&config.tmpdir)?;
    let safe_prefix_str = safe_prefix(config);
    let split_lines = match &config.output {
        OutputSpec::Sharded { split_lines, .. } => Some(*split_lines),
        _ => None,
    };

    let (tx, rx) = sync_channel::<WorkItem>(QUEUE_CAPACITY);
    let rx = Arc::new(Mutex::new(rx));

    let mut handles = Vec::new();
    for worker_id in 0..config.workers {
        let rx = Arc::clone(&rx);
        let tmp_dir = temp_dir.path().to_path_buf();
        let prefix = safe_prefix_str.clone();
        let newline_flatten = config.resolve_newline_flatten();
        handles.push(thread::spawn(move || {
            worker_loop(worker_id, rx, tmp_dir, prefix, split_lines, newline_flatten)
        }));
    }

    let seq_counter = AtomicU64::new(0);
    let mut stats = RunStats::new();
    let parse_result: Result<u64> = (|| {
        let mut feed = ElementFeed::open(reader, config.buffer_size, &config.key, source_name)?;
        let mut scanner = feed.scanner();
        loop {
            let Some(elem) = scanner.next_element()? else {
                break;
            };
            let seq = seq_counter.fetch_add(1, Ordering::Relaxed) + 1;
            stats.elements = seq;
            stats.bytes_read = scanner.bytes_read();
            stats.maybe_report(config.verbose, err);
            if tx.send(WorkItem::Element(QueueItem { seq, bytes: elem })).is_err() {
                // All workers have disconnected — one of them hit a fatal
                // error. Stop feeding; the error is collected below.
                break;
            }
        }
        drop(scanner);
        Ok(feed.bytes_read())
    })();

    for _ in 0..config.workers {
        let _ = tx.send(WorkItem::Shutdown);
    }
    drop(tx);

    let mut per_worker_counts = Vec::with_capacity(config.workers);
    let mut first_worker_error = None;
    for (worker_id, handle) in handles.into_iter().enumerate() {
        let outcome = handle.join().expect("worker thread panicked");
        if first_worker_error.is_none() {
            if let Some(e) = outcome.error {
                first_worker_error = Some((worker_id, e));
            }
        }
        per_worker_counts.push(outcome.chunk_counts);
    }

    if let Some((worker_id, io_err)) = first_worker_error {
        drain_and_unlink(temp_dir.path());
        temp_dir.cleanup();
        return Err(ExtractError::WorkerFailure {
            worker_id,
            source: io_err,
        });
    }

    let bytes_read = parse_result.inspect_err(|_| {
        drain_and_unlink(temp_dir.path());
        temp_dir.cleanup();
    })?;

    let completed = merge_chunks(
        config,
        temp_dir.path(),
        &safe_prefix_str,
        config.workers,
        &per_worker_counts,
    )?;
    temp_dir.cleanup();

    stats.bytes_read = bytes_read;
    let total_elements: u64 = completed.iter().map(|(_, n)| *n).sum();
    stats.elements = total_elements;
    stats.summary(err, &completed);

    Ok(total_elements)
}

fn drain_and_unlink(tmp_dir: &Path) {
    if let Ok(entries) = std::fs::read_dir(tmp_dir) {
        for entry in entries.flatten() {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputSource, NewlineFlatten};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn config_with(output: OutputSpec, workers: usize, tmpdir: PathBuf) -> ExtractorConfig {
        ExtractorConfig {
            input: InputSource::Stdin,
            output,
            key: "accounts".to_string(),
            mode: OutputMode::Ndjson,
            buffer_size: 4096,
            workers,
            tmpdir,
            verbose: false,
            newline_flatten: NewlineFlatten::Auto,
        }
    }

    #[test]
    fn parallel_single_file_preserves_all_elements_unordered_tolerant() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.ndjson");
        let config = config_with(
            OutputSpec::SingleFile(out.clone()),
            4,
            dir.path().to_path_buf(),
        );
        let input = {
            let mut s = String::from(r#"{"accounts":["#);
            for i in 0..50 {
                if i > 0 {
                    s.push(',');
                }
                s.push_str(&format!(r#"{{"id":{i}}}"#));
            }
            s.push_str("]}");
            s
        };
        let mut err = Vec::new();
        let n = run_parallel(Cursor::new(input.into_bytes()), &config, "test", &mut err).unwrap();
        assert_eq!(n, 50);

        let text = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 50);
        let mut ids: Vec<u32> = lines.iter().map(|l| extract_id(l)).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..50).collect::<Vec<_>>());
    }

    /// Pulls `N` out of a `{"id":N}` line without pulling in a JSON crate.
    fn extract_id(line: &str) -> u32 {
        let start = line.find(':').unwrap() + 1;
        let end = line.rfind('}').unwrap();
        line[start..end].parse().unwrap()
    }

    #[test]
    fn parallel_sharded_produces_correct_total_records_no_empty_shards() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("p");
        let config = config_with(
            OutputSpec::Sharded {
                prefix: prefix.clone(),
                split_lines: 7,
            },
            3,
            dir.path().to_path_buf(),
        );
        let input = {
            let mut s = String::from(r#"{"accounts":["#);
            for i in 0..20 {
                if i > 0 {
                    s.push(',');
                }
                s.push_str(&i.to_string());
            }
            s.push_str("]}");
            s
        };
        let mut err = Vec::new();
        let n = run_parallel(Cursor::new(input.into_bytes()), &config, "test", &mut err).unwrap();
        assert_eq!(n, 20);

        // ceil(20/7) = 3 shards: 7, 7, 6
        let shard1 = format!("{}_00001.ndjson", prefix.display());
        let shard2 = format!("{}_00002.ndjson", prefix.display());
        let shard3 = format!("{}_00003.ndjson", prefix.display());
        let shard4 = format!("{}_00004.ndjson", prefix.display());
        assert_eq!(std::fs::read_to_string(&shard1).unwrap().lines().count(), 7);
        assert_eq!(std::fs::read_to_string(&shard2).unwrap().lines().count(), 7);
        assert_eq!(std::fs::read_to_string(&shard3).unwrap().lines().count(), 6);
        assert!(!Path::new(&shard4).exists());
    }

    #[test]
    fn temp_directory_is_removed_on_success() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.ndjson");
        let config = config_with(
            OutputSpec::SingleFile(out),
            2,
            dir.path().to_path_buf(),
        );
        let input = br#"{"accounts":[1,2,3]}"#;
        let mut err = Vec::new();
        run_parallel(Cursor::new(input.to_vec()), &config, "test", &mut err).unwrap();

        let leftover: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".jxtract-"))
            .collect();
        assert!(leftover.is_empty());
    }
}
