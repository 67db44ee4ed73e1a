//! CLI front-end & config (C0).
//!
//! The external surface is a flat list of `key=value` tokens plus a
//! handful of bare flags (`ndjson`, `no-ndjson`, `verbose`) — not the
//! conventional `--flag value` shape. `clap` still fronts the binary so
//! `--help`/`--version` and unknown-option diagnostics come for free, but
//! the tokens themselves are parsed by [`parse_args`] below.

use std::path::PathBuf;

use crate::error::{ExtractError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Ndjson,
    JsonArray,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSpec {
    Stdout,
    SingleFile(PathBuf),
    Sharded { prefix: PathBuf, split_lines: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewlineFlatten {
    /// NDJSON default-on / JSON_ARRAY default-off, per mode.
    Auto,
    ForceOn,
    ForceOff,
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub input: InputSource,
    pub output: OutputSpec,
    pub key: String,
    pub mode: OutputMode,
    pub buffer_size: usize,
    pub workers: usize,
    pub tmpdir: PathBuf,
    pub verbose: bool,
    pub newline_flatten: NewlineFlatten,
}

impl ExtractorConfig {
    pub fn resolve_newline_flatten(&self) -> bool {
        match self.newline_flatten {
            NewlineFlatten::ForceOn => true,
            NewlineFlatten::ForceOff => false,
            NewlineFlatten::Auto => matches!(self.mode, OutputMode::Ndjson),
        }
    }
}

const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;
const DEFAULT_KEY: &str = "accounts";

/// Parse the flat `key=value` / bare-flag token list (everything after the
/// binary name and past whatever clap consumed) into a validated config.
pub fn parse_args(tokens: &[String], default_workers: usize) -> Result<ExtractorConfig> {
    let mut in_path: Option<String> = None;
    let mut out_path: Option<String> = None;
    let mut key: Option<String> = None;
    let mut ndjson: Option<bool> = None;
    let mut split_lines: Option<u64> = None;
    let mut split_prefix: Option<String> = None;
    let mut buffer: Option<usize> = None;
    let mut workers: Option<usize> = None;
    let mut tmpdir: Option<String> = None;
    let mut verbose = false;

    for token in tokens {
        match token.as_str() {
            "ndjson" => ndjson = Some(true),
            "no-ndjson" => ndjson = Some(false),
            "verbose" => verbose = true,
            _ => {
                let Some((k, v)) = token.split_once('=') else {
                    return Err(ExtractError::bad_config(format!(
                        "unrecognized option: {token}"
                    )));
                };
                match k {
                    "in" => in_path = Some(v.to_string()),
                    "out" => out_path = Some(v.to_string()),
                    "key" => key = Some(v.to_string()),
                    "split-lines" => {
                        split_lines = Some(v.parse::<u64>().map_err(|_| {
                            ExtractError::bad_config(format!("invalid split-lines: {v}"))
                        })?)
                    }
                    "split-prefix" => split_prefix = Some(v.to_string()),
                    "buffer" => {
                        buffer = Some(v.parse::<usize>().map_err(|_| {
                            ExtractError::bad_config(format!("invalid buffer size: {v}"))
                        })?)
                    }
                    "workers" => {
                        workers = Some(v.parse::<usize>().map_err(|_| {
                            ExtractError::bad_config(format!("invalid workers: {v}"))
                        })?)
                    }
                    "tmpdir" => tmpdir = Some(v.to_string()),
                    _ => {
                        return Err(ExtractError::bad_config(format!(
                            "unrecognized option: {token}"
                        )));
                    }
                }
            }
        }
    }

    let input = match in_path.as_deref() {
        None | Some("-") => InputSource::Stdin,
        Some(p) => InputSource::File(PathBuf::from(p)),
    };

    let mode = match ndjson {
        Some(true) | None => OutputMode::Ndjson,
        Some(false) => OutputMode::JsonArray,
    };

    let buffer_size = buffer.unwrap_or(DEFAULT_BUFFER_SIZE);
    if buffer_size == 0 {
        return Err(ExtractError::bad_config("buffer must be greater than 0"));
    }

    if split_lines.is_some() != split_prefix.is_some() {
        return Err(ExtractError::bad_config(
            "split-lines and split-prefix must be given together",
        ));
    }
    // split-lines=0 means "no sharding", same as leaving both options absent.
    let has_split = split_lines.is_some_and(|n| n > 0) && split_prefix.is_some();
    let is_stdout = matches!(out_path.as_deref(), Some("-")) || (out_path.is_none() && !has_split);

    let output = if has_split {
        if matches!(out_path.as_deref(), Some("-")) {
            return Err(ExtractError::bad_config(
                "split-prefix cannot be combined with out=-",
            ));
        }
        OutputSpec::Sharded {
            prefix: PathBuf::from(split_prefix.unwrap()),
            split_lines: split_lines.unwrap(),
        }
    } else if is_stdout {
        OutputSpec::Stdout
    } else {
        OutputSpec::SingleFile(PathBuf::from(out_path.unwrap()))
    };

    let workers = workers.unwrap_or(default_workers).max(1);
    if workers > 1 && mode == OutputMode::JsonArray {
        return Err(ExtractError::bad_config(
            "workers > 1 is only supported in NDJSON mode",
        ));
    }

    Ok(ExtractorConfig {
        input,
        output,
        key: key.unwrap_or_else(|| DEFAULT_KEY.to_string()),
        mode,
        buffer_size,
        workers,
        tmpdir: tmpdir.map(PathBuf::from).unwrap_or_else(std::env::temp_dir),
        verbose,
        newline_flatten: NewlineFlatten::Auto,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_stdin_stdout_ndjson_accounts() {
        let cfg = parse_args(&[], 1).unwrap();
        assert_eq!(cfg.input, InputSource::Stdin);
        assert_eq!(cfg.output, OutputSpec::Stdout);
        assert_eq!(cfg.key, "accounts");
        assert_eq!(cfg.mode, OutputMode::Ndjson);
    }

    #[test]
    fn parses_in_out_key() {
        let cfg = parse_args(&toks(&["in=data.json", "out=result.ndjson", "key=items"]), 1).unwrap();
        assert_eq!(cfg.input, InputSource::File("data.json".into()));
        assert_eq!(cfg.output, OutputSpec::SingleFile("result.ndjson".into()));
        assert_eq!(cfg.key, "items");
    }

    #[test]
    fn split_requires_both_fields() {
        let err = parse_args(&toks(&["split-lines=10"]), 1).unwrap_err();
        assert!(matches!(err, ExtractError::BadConfig { .. }));

        let err = parse_args(&toks(&["split-prefix=/tmp/x"]), 1).unwrap_err();
        assert!(matches!(err, ExtractError::BadConfig { .. }));
    }

    #[test]
    fn split_with_stdout_is_bad_config() {
        let err = parse_args(
            &toks(&["split-lines=10", "split-prefix=/tmp/x", "out=-"]),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::BadConfig { .. }));
    }

    #[test]
    fn sharded_output_parses() {
        let cfg = parse_args(
            &toks(&["split-lines=2", "split-prefix=/tmp/x"]),
            1,
        )
        .unwrap();
        assert_eq!(
            cfg.output,
            OutputSpec::Sharded {
                prefix: "/tmp/x".into(),
                split_lines: 2
            }
        );
    }

    #[test]
    fn split_lines_zero_means_no_sharding() {
        let cfg = parse_args(&toks(&["split-lines=0", "split-prefix=/tmp/x"]), 1).unwrap();
        assert_eq!(cfg.output, OutputSpec::Stdout);

        let cfg = parse_args(
            &toks(&["split-lines=0", "split-prefix=/tmp/x", "out=result.ndjson"]),
            1,
        )
        .unwrap();
        assert_eq!(cfg.output, OutputSpec::SingleFile("result.ndjson".into()));
    }

    #[test]
    fn zero_buffer_is_bad_config() {
        let err = parse_args(&toks(&["buffer=0"]), 1).unwrap_err();
        assert!(matches!(err, ExtractError::BadConfig { .. }));
    }

    #[test]
    fn workers_over_one_with_json_array_is_bad_config() {
        let err = parse_args(&toks(&["no-ndjson", "workers=4"]), 1).unwrap_err();
        assert!(matches!(err, ExtractError::BadConfig { .. }));
    }

    #[test]
    fn unrecognized_token_is_bad_config() {
        let err = parse_args(&toks(&["bogus"]), 1).unwrap_err();
        assert!(matches!(err, ExtractError::BadConfig { .. }));
    }

    #[test]
    fn newline_flatten_auto_defaults_by_mode() {
        let ndjson_cfg = parse_args(&[], 1).unwrap();
        assert!(ndjson_cfg.resolve_newline_flatten());

        let array_cfg = parse_args(&toks(&["no-ndjson"]), 1).unwrap();
        assert!(!array_cfg.resolve_newline_flatten());
    }
}
