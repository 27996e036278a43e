//! Error taxonomy for the perception pipeline
//!
//! - `Permission` and `Init` are terminal for a session: it goes inert until the
//!   user selects a variant again.
//! - `Closed` means a model was used after teardown. It stops the frame loop but
//!   is never reported to the user.
//! - `Frame` and `Inference` skip the current tick and are retried on the next one.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by camera, model and scheduler operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Camera unavailable: {0}")]
    Permission(String),
    #[error("Model failed to initialize: {0}")]
    Init(String),
    #[error("Model handle is closed")]
    Closed,
    #[error("Frame not ready ({width}x{height})")]
    Frame { width: u32, height: u32 },
    #[error("Inference failed: {0}")]
    Inference(String),
}

impl PipelineError {
    /// Whether this error ends the session (no retry without a new `start`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Permission(_) | Self::Init(_))
    }

    /// Short machine-readable kind, used in logs and host events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Permission(_) => "permission",
            Self::Init(_) => "init",
            Self::Closed => "closed",
            Self::Frame { .. } => "frame",
            Self::Inference(_) => "inference",
        }
    }
}

/// Errors that can occur while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
