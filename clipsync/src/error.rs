//! Application-wide error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("duplicate entry: {video_id} ({source_url}) already in inventory")]
    DuplicateEntry {
        video_id: String,
        source_url: String,
    },

    #[error("record not found: {video_id}")]
    NotFound { video_id: String },

    #[error("timed out acquiring inventory lock {path} after {timeout:?}")]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("corrupt inventory at {path}: {reason}")]
    CorruptInventory { path: PathBuf, reason: String },

    #[error("download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("transform failed for {input}: {reason}")]
    Transform { input: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error while {op} {path}: {source}")]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn duplicate(video_id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self::DuplicateEntry {
            video_id: video_id.into(),
            source_url: source_url.into(),
        }
    }

    pub fn not_found(video_id: impl Into<String>) -> Self {
        Self::NotFound {
            video_id: video_id.into(),
        }
    }

    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn download(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn transform(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transform {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.into(),
            source,
        }
    }

    /// Whether the error leaves the caller unable to trust the store
    /// (fail-closed conditions from the propagation policy).
    pub fn is_store_fatal(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::CorruptInventory { .. }
        )
    }
}
