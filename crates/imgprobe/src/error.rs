//! Error types for fatal pipeline conditions.
//!
//! Per-candidate failures are not errors: they are reported as
//! [`FetchOutcome`](crate::fetch::FetchOutcome) variants and never abort a
//! run. `ProbeError` covers the conditions that do.

use std::path::PathBuf;

/// All fatal errors the pipeline can raise.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Duplicate entity id in catalog: {0}")]
    DuplicateEntity(String),

    #[error("Failed to write manifest {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A per-card failure during page extraction. Logged and skipped.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("unresolvable image url {url:?} in card {card}")]
    ImageUrl { card: usize, url: String },
}

pub type ProbeResult<T> = Result<T, ProbeError>;
