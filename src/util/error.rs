//! Error types for scene loading and GPU tracing.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for scenetrace operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Scene file could not be read
    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scene text violates the block grammar (0-based line)
    #[error("Malformed scene at line {line}: {reason}")]
    MalformedScene { line: usize, reason: String },

    /// GPU buffer/texture allocation or submission failed
    #[error("GPU resource error: {0}")]
    GpuResource(String),

    /// Invalid dispatch configuration (thread-group dimensions, image size)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Settings file could not be (de)serialized
    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a malformed-scene error for a 0-based line.
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedScene { line, reason: reason.into() }
    }

    /// Create a GPU resource error.
    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::GpuResource(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Line number of a malformed-scene error.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::MalformedScene { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Result type alias for scenetrace operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::malformed(12, "unknown block header 'Cone'");
        let msg = e.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("Cone"));
        assert_eq!(e.line(), Some(12));

        let e = Error::config("thread-group size must be non-zero");
        assert!(e.to_string().contains("non-zero"));
        assert_eq!(e.line(), None);
    }

    #[test]
    fn test_error_io_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::io("scenes/missing.txt", io_err);
        assert!(err.to_string().contains("scenes/missing.txt"));
        assert!(matches!(err, Error::Io { .. }));
    }
}
