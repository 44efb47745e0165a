//! Custom error types for the Swarm fan-out engine.
//!
//! Every failure a work unit, the dispatcher or the configuration layer can
//! produce is expressed as a [`SwarmError`]. HTTP failures inside a batch
//! fetch are kept separate as [`crate::fetcher::FetchError`] because they are
//! captured as values, never raised.

use std::path::PathBuf;
use std::time::Duration;

/// The main error type for Swarm operations.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    /// I/O error (input file, config file, child process, etc.)
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration detected before any work was scheduled
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Input rejected by a work unit or by the dispatcher
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Network request could not be completed
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// Operation did not finish in time
    #[error("Timed out after {:.2}s: {context}", elapsed.as_secs_f64())]
    Timeout { context: String, elapsed: Duration },

    /// Shell command exited unsuccessfully
    #[error("Command `{command}` exited with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    /// A work unit panicked while processing a target
    #[error("Work unit panicked on target '{target}': {message}")]
    Panicked { target: String, message: String },

    /// Thread pool initialization error
    #[error("Failed to initialize thread pool: {0}")]
    ThreadPool(String),

    /// The worker pool stopped reporting before the batch was collected
    #[error("Worker pool failure: {0}")]
    Dispatch(String),

    /// Async runtime could not be built for a worker thread
    #[error("Failed to build async runtime: {0}")]
    Runtime(String),

    /// Generic error for external library errors
    #[error("{context}: {message}")]
    External { context: String, message: String },
}

/// Result type alias using SwarmError
pub type SwarmResult<T> = Result<T, SwarmError>;

impl SwarmError {
    /// Create an I/O error with path context
    pub fn io(source: std::io::Error, path: impl Into<Option<PathBuf>>) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a request error for the given URL
    pub fn request(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(context: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            context: context.into(),
            elapsed,
        }
    }

    /// Create an external error with context
    pub fn external(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::External {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Short name of the error variant, used in technical log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "Io",
            Self::Json(_) => "Json",
            Self::Config(_) => "Config",
            Self::Validation(_) => "Validation",
            Self::Request { .. } => "Request",
            Self::Timeout { .. } => "Timeout",
            Self::Command { .. } => "Command",
            Self::Panicked { .. } => "Panicked",
            Self::ThreadPool(_) => "ThreadPool",
            Self::Dispatch(_) => "Dispatch",
            Self::Runtime(_) => "Runtime",
            Self::External { .. } => "External",
        }
    }

    /// Failures that are part of normal operation against live targets.
    ///
    /// These are reported without a backtrace.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Request { .. } | Self::Timeout { .. }
        )
    }
}

/// Convert from raw I/O errors (without path context)
impl From<std::io::Error> for SwarmError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: None, source }
    }
}
