//! Output router (C4).
//!
//! Decides the target sink for each emitted element: a single file (or
//! stdout), or a sequence of size-sharded chunk files; in either NDJSON or
//! JSON-array framing. Chunk files are created lazily — a chunk exists on
//! disk iff at least one element was written to it — and the final chunk is
//! never left empty.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{OutputMode, OutputSpec};
use crate::error::{ExtractError, Result};

pub(crate) fn flatten_newlines(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .map(|&b| if b == b'\n' || b == b'\r' { b' ' } else { b })
        .collect()
}

pub(crate) fn extension(mode: OutputMode) -> &'static str {
    match mode {
        OutputMode::Ndjson => "ndjson",
        OutputMode::JsonArray => "json",
    }
}

pub(crate) fn shard_path(prefix: &Path, index: u32, mode: OutputMode) -> PathBuf {
    let mut name = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(&format!("_{index:05}.{}", extension(mode)));
    match prefix.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

/// Bookkeeping for a single currently-open chunk (or the unsharded single
/// file, treated as "chunk 1 with unbounded capacity").
struct ChunkState {
    index: u32,
    path: Option<PathBuf>,
    handle: Option<BufWriter<File>>,
    records: u64,
    wrote_any_to_file: bool,
}

impl ChunkState {
    fn new(index: u32) -> Self {
        Self {
            index,
            path: None,
            handle: None,
            records: 0,
            wrote_any_to_file: false,
        }
    }
}

pub struct OutputRouter {
    mode: OutputMode,
    newline_flatten: bool,
    spec: OutputSpec,
    stdout_first_write: bool,
    stdout: Option<BufWriter<std::io::Stdout>>,
    single_file: Option<(BufWriter<File>, PathBuf, bool)>,
    chunk: Option<ChunkState>,
    pub completed_chunks: Vec<(String, u64)>,
}

impl OutputRouter {
    pub fn new(spec: OutputSpec, mode: OutputMode, newline_flatten: bool) -> Result<Self> {
        let chunk = if matches!(spec, OutputSpec::Sharded { .. }) {
            Some(ChunkState::new(1))
        } else {
            None
        };
        Ok(Self {
            mode,
            newline_flatten,
            spec,
            stdout_first_write: true,
            stdout: None,
            single_file: None,
            chunk,
            completed_chunks: Vec::new(),
        })
    }

    pub fn current_chunk_index(&self) -> u32 {
        self.chunk.as_ref().map(|c| c.index).unwrap_or(1)
    }

    pub fn current_chunk_records(&self) -> u64 {
        self.chunk.as_ref().map(|c| c.records).unwrap_or(0)
    }

    pub fn write_element(&mut self, bytes: &[u8]) -> Result<()> {
        let line: Vec<u8> = if self.newline_flatten {
            flatten_newlines(bytes)
        } else {
            bytes.to_vec()
        };

        match &self.spec.clone() {
            OutputSpec::Stdout => self.write_stdout(&line),
            OutputSpec::SingleFile(path) => self.write_single_file(path, &line),
            OutputSpec::Sharded {
                prefix,
                split_lines,
            } => self.write_sharded(prefix, *split_lines, &line),
        }
    }

    fn write_stdout(&mut self, line: &[u8]) -> Result<()> {
        if self.stdout.is_none() {
            self.stdout = Some(BufWriter::new(std::io::stdout()));
        }
        let first = self.stdout_first_write;
        self.stdout_first_write = false;
        let out = self.stdout.as_mut().unwrap();
        write_framed(out, line, self.mode, first, "<stdout>")?;
        Ok(())
    }

    fn write_single_file(&mut self, path: &Path, line: &[u8]) -> Result<()> {
        if self.single_file.is_none() {
            let file = File::create(path).map_err(|e| ExtractError::io(path, e))?;
            self.single_file = Some((BufWriter::new(file), path.to_path_buf(), true));
            tracing::debug!(path = %path.display(), "created output file");
        }
        let (writer, path_buf, first) = self.single_file.as_mut().unwrap();
        let was_first = *first;
        *first = false;
        write_framed(writer, line, self.mode, was_first, &path_buf.display().to_string())
    }

    fn write_sharded(&mut self, prefix: &Path, split_lines: u64, line: &[u8]) -> Result<()> {
        let chunk = self.chunk.get_or_insert_with(|| ChunkState::new(1));
        if chunk.handle.is_none() {
            let path = shard_path(prefix, chunk.index, self.mode);
            let file = File::create(&path).map_err(|e| ExtractError::io(&path, e))?;
            tracing::debug!(path = %path.display(), chunk = chunk.index, "created shard");
            chunk.handle = Some(BufWriter::new(file));
            chunk.path = Some(path);
        }
        let first = chunk.records == 0;
        {
            let writer = chunk.handle.as_mut().unwrap();
            let path_display = chunk.path.as_ref().unwrap().display().to_string();
            write_framed(writer, line, self.mode, first, &path_display)?;
        }
        chunk.records += 1;
        chunk.wrote_any_to_file = true;

        if chunk.records >= split_lines {
            self.close_current_chunk()?;
            let next_index = self.chunk.as_ref().map(|c| c.index).unwrap_or(1) + 1;
            self.chunk = Some(ChunkState::new(next_index));
        }
        Ok(())
    }

    fn close_current_chunk(&mut self) -> Result<()> {
        let Some(chunk) = self.chunk.take() else {
            return Ok(());
        };
        let Some(mut writer) = chunk.handle else {
            return Ok(());
        };
        let path = chunk.path.expect("handle implies path");
        if matches!(self.mode, OutputMode::JsonArray) {
            writer.write_all(b"]").map_err(|e| ExtractError::io(&path, e))?;
        }
        writer.flush().map_err(|e| ExtractError::io(&path, e))?;
        drop(writer);

        if chunk.records == 0 {
            // Defensive: lazy creation means this should be unreachable, but
            // honor the "no zero-record shard survives" invariant anyway.
            let _ = std::fs::remove_file(&path);
        } else {
            self.completed_chunks
                .push((path.display().to_string(), chunk.records));
        }
        Ok(())
    }

    /// Finalize all open sinks: write the closing `]` for JSON_ARRAY mode,
    /// close the final (possibly partial) shard, and flush everything.
    pub fn finalize(&mut self) -> Result<()> {
        if let Some(stdout) = self.stdout.as_mut() {
            if matches!(self.mode, OutputMode::JsonArray) && !self.stdout_first_write {
                stdout
                    .write_all(b"]")
                    .map_err(|e| ExtractError::io("<stdout>", e))?;
            }
            stdout.flush().map_err(|e| ExtractError::io("<stdout>", e))?;
        }
        if let Some((writer, path, first)) = self.single_file.as_mut() {
            if matches!(self.mode, OutputMode::JsonArray) && !*first {
                writer.write_all(b"]").map_err(|e| ExtractError::io(&*path, e))?;
            }
            writer.flush().map_err(|e| ExtractError::io(&*path, e))?;
        }
        self.close_current_chunk()?;
        Ok(())
    }
}

fn write_framed<W: Write>(
    w: &mut W,
    line: &[u8],
    mode: OutputMode,
    first: bool,
    path_for_errors: &str,
) -> Result<()> {
    match mode {
        OutputMode::Ndjson => {
            w.write_all(line)
                .and_then(|_| w.write_all(b"\n"))
                .map_err(|e| ExtractError::io(path_for_errors, e))
        }
        OutputMode::JsonArray => {
            if first {
                w.write_all(b"[").map_err(|e| ExtractError::io(path_for_errors, e))?;
            } else {
                w.write_all(b",").map_err(|e| ExtractError::io(path_for_errors, e))?;
            }
            w.write_all(line)
                .map_err(|e| ExtractError::io(path_for_errors, e))
        }
    }
}
