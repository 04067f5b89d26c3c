//! Error types for triad-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ResourcePath;

/// Failures raised by local/remote tree accessors and property stores.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Underlying I/O failure, annotated with the path that was touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote accessor could not produce data for a resource.
    #[error("remote access failed for {path}: {message}")]
    Remote { path: ResourcePath, message: String },

    /// A stored token could not be decoded by the backend.
    #[error("malformed sync token for {path}: {message}")]
    MalformedToken { path: ResourcePath, message: String },

    /// The operation observed a cancelled progress monitor.
    #[error("operation canceled")]
    Canceled,
}

/// Convenience constructor for [`TreeError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TreeError {
    TreeError::Io {
        path: path.into(),
        source,
    }
}

/// All errors that can arise from subscriber configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path.
    #[error("failed to parse subscriber config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so `~/.triad/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No configuration file exists for the requested subscriber.
    #[error("subscriber config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Subscriber names become file names; separators and dot-names are rejected.
    #[error("invalid subscriber name '{0}'")]
    InvalidName(String),
}
