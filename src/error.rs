//! Error types for the harvest pipeline.
//!
//! Only [`HarvestError`] ever escapes a run. Render, merge and checkpoint-append
//! faults are contained per item by the orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Faults raised by a page renderer.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("no element matches selector {0}")]
    ElementNotFound(String),
    #[error("renderer protocol error: {0}")]
    Protocol(String),
}

impl RenderError {
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Summary and detail disagree on which item they describe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("summary id {summary_id} does not match detail id {detail_id}")]
    IdMismatch {
        summary_id: String,
        detail_id: String,
    },
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint file {path} is not a valid record array: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode checkpoint records: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Run-fatal errors. Everything else is contained at the item level.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("renderer could not be started: {0}")]
    RendererSetup(String),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("invalid configuration: {0}")]
    Config(String),
}
