//! Unified error type for the pox workspace.
//!
//! Every variant carries enough context (path, command line, tool status,
//! captured output) to be reported on its own by the top-level caller.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ToolStatus;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum PoxError {
    /// Invalid mode selection or missing operands.
    #[error("usage: {message}")]
    Usage {
        /// What was wrong with the invocation.
        message: String,
    },

    /// The dependency inspector rejected an input or exited non-zero.
    #[error("resolving dependencies of {inputs} failed ({status}): {diagnostic}")]
    Resolution {
        /// The inputs handed to the inspector, space separated.
        inputs: String,
        /// Diagnostic text captured from the inspector.
        diagnostic: String,
        /// Inspector exit status.
        status: ToolStatus,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The archive packaging tool failed.
    #[error("{command}: {status}: {output}")]
    Packaging {
        /// Command line that was run.
        command: String,
        /// Combined stdout and stderr of the tool.
        output: String,
        /// Tool exit status.
        status: ToolStatus,
    },

    /// The archive extraction tool failed.
    #[error("{command}: {status}: {output}")]
    Extraction {
        /// Command line that was run.
        command: String,
        /// Combined stdout and stderr of the tool.
        output: String,
        /// Tool exit status.
        status: ToolStatus,
    },

    /// A mount, unmount, or loop-device attach/detach failed.
    #[error("{operation} {path} failed: {source}")]
    Mount {
        /// Operation that failed, e.g. `mount` or `detach loop device`.
        operation: &'static str,
        /// Mount target or device path.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Changing the process root was denied.
    #[error("permission denied: {message}")]
    Permission {
        /// Description of the denied operation.
        message: String,
    },
}

impl PoxError {
    /// Builds a [`PoxError::Usage`] from any message.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Wraps an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PoxError>;
