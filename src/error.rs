//! Typed error model for the extractor (C7).
//!
//! Every fatal condition the pipeline can hit maps to exactly one variant
//! here, and [`ExtractError::exit_code`] is the single place that turns a
//! variant into a process exit code. Nothing downstream of `main` should
//! need to know the exit code table; it lives here only.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("input file not found: {path}")]
    InputNotFound { path: String },

    #[error("target array not found (key={key:?})")]
    TargetNotFound { key: String },

    #[error("truncated element at byte offset {offset}")]
    TruncatedElement { offset: u64 },

    #[error("bad configuration: {message}")]
    BadConfig { message: String },

    #[error("worker {worker_id} failed: {source}")]
    WorkerFailure {
        worker_id: usize,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    /// 0 success (never constructed here), 1 malformed/truncated/not-found,
    /// 2 bad usage / missing input file.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExtractError::Io { .. } => 1,
            ExtractError::InputNotFound { .. } => 2,
            ExtractError::TargetNotFound { .. } => 1,
            ExtractError::TruncatedElement { .. } => 1,
            ExtractError::BadConfig { .. } => 2,
            ExtractError::WorkerFailure { .. } => 1,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::Io {
            path: path.into().display().to_string(),
            source,
        }
    }

    pub fn input_not_found(path: impl Into<PathBuf>) -> Self {
        ExtractError::InputNotFound {
            path: path.into().display().to_string(),
        }
    }

    pub fn bad_config(message: impl Into<String>) -> Self {
        ExtractError::BadConfig {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_exit_code_table() {
        assert_eq!(
            ExtractError::TargetNotFound {
                key: "accounts".into()
            }
            .exit_code(),
            1
        );
        assert_eq!(
            ExtractError::TruncatedElement { offset: 12 }.exit_code(),
            1
        );
        assert_eq!(ExtractError::bad_config("nope").exit_code(), 2);
        assert_eq!(ExtractError::input_not_found("missing.json").exit_code(), 2);
        assert_eq!(
            ExtractError::WorkerFailure {
                worker_id: 2,
                source: std::io::Error::other("disk full"),
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn messages_name_the_condition() {
        let e = ExtractError::TargetNotFound {
            key: "accounts".into(),
        };
        assert!(e.to_string().contains("accounts"));
    }
}
