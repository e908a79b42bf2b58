use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SrcRecError {
    #[error("Missing {what}: {}", .path.display())]
    MissingInput { what: String, path: PathBuf },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Numerical failure: {0}")]
    NumericalFailure(String),

    #[error("Failed to write {}: {reason}", .path.display())]
    OutputWrite { path: PathBuf, reason: String },

    #[error("Refusing to overwrite existing file: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("Toolkit unavailable: {0}")]
    ToolkitUnavailable(String),

    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse classification used in logs and batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    MalformedInput,
    NumericalFailure,
    OutputWriteFailure,
    ToolkitUnavailable,
    Protocol,
    Configuration,
    Io,
}

impl SrcRecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput { .. } => ErrorKind::MissingInput,
            Self::MalformedInput(_) => ErrorKind::MalformedInput,
            Self::NumericalFailure(_) => ErrorKind::NumericalFailure,
            Self::OutputWrite { .. } | Self::OutputExists(_) => ErrorKind::OutputWriteFailure,
            Self::ToolkitUnavailable(_) => ErrorKind::ToolkitUnavailable,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Config(_) | Self::InvalidParameter(_) => ErrorKind::Configuration,
            Self::IoError(_) => ErrorKind::Io,
        }
    }

    pub fn missing(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingInput {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn output_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::OutputWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SrcRecError>;
