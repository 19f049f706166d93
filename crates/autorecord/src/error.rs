//! Error types for the record/replay engine.

use std::path::PathBuf;

/// Result type alias using [`AutorecordError`]
pub type Result<T, E = AutorecordError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum AutorecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed JSON in {path}: {source}")]
    MalformedArtifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid mock record: {0}")]
    InvalidRecord(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unsupported mock index version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u64, supported: u64 },

    #[error("Host task '{task}' failed: {reason}")]
    HostTask { task: String, reason: String },
}

impl AutorecordError {
    pub fn transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        AutorecordError::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn host_task(task: &str, reason: impl std::fmt::Display) -> Self {
        AutorecordError::HostTask {
            task: task.to_string(),
            reason: reason.to_string(),
        }
    }
}
