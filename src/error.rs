//! Error kinds for the schedule core.
//!
//! None of these are fatal: callers log them and keep ticking.

use std::path::PathBuf;
use thiserror::Error;

/// Reading or writing the schedule file or the roster file failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode schedule")]
    Encode(#[source] serde_json::Error),
}

/// A single open/quit/probe request for one managed application failed.
#[derive(Debug, Error)]
pub enum ProcessControlError {
    #[error("failed to {action} {identity}")]
    Spawn {
        action: &'static str,
        identity: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{action} {identity} exited with {status}")]
    Status {
        action: &'static str,
        identity: String,
        status: std::process::ExitStatus,
    },
    #[error("{action} {identity} timed out after {after:?}")]
    Timeout {
        action: &'static str,
        identity: String,
        after: std::time::Duration,
    },
}

/// A roster line that could not be taken as written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("line {line}: delay {raw:?} is not a number, using 0")]
    InvalidDelay { line: usize, raw: String },
    #[error("line {line}: negative delay {raw:?}, using 0")]
    NegativeDelay { line: usize, raw: String },
    #[error("line {line}: no application after the delay, skipped")]
    EmptyIdentity { line: usize },
}
