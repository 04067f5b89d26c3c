//! Error types for triad-sync.

use std::path::PathBuf;

use thiserror::Error;

use triad_core::{Resource, ResourcePath, TreeError};

/// All errors that can arise from cache, refresh and subscriber operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A local tree or property store failure.
    #[error("tree error: {0}")]
    Tree(TreeError),

    /// The remote accessor failed while building the remote tree.
    #[error("remote tree for {resource} could not be built: {source}")]
    Remote {
        resource: ResourcePath,
        #[source]
        source: TreeError,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (token store).
    #[error("token store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Mutation attempted on a layer that only derives tokens.
    #[error("{layer} layer is read-only")]
    ReadOnlyLayer { layer: &'static str },

    /// A change was recorded on a thread that holds no coordinator scope.
    #[error("no active operation scope on the current thread")]
    NoActiveScope,

    /// The progress monitor was cancelled.
    #[error("operation canceled")]
    Canceled,

    /// One or more roots failed to refresh; the others were still processed.
    #[error("refresh failed for {failed} resource(s); first failure: {first}")]
    Refresh { failed: usize, first: String },
}

impl From<TreeError> for SyncError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Canceled => SyncError::Canceled,
            other => SyncError::Tree(other),
        }
    }
}

impl SyncError {
    /// Wrap a remote accessor failure, keeping cancellation distinct.
    pub(crate) fn remote(resource: &ResourcePath, source: TreeError) -> Self {
        match source {
            TreeError::Canceled => SyncError::Canceled,
            source => SyncError::Remote {
                resource: resource.clone(),
                source,
            },
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, SyncError::Canceled)
    }

    /// Fold per-resource failures into one [`SyncError::Refresh`].
    pub(crate) fn aggregate(failures: &[(Resource, SyncError)]) -> Option<SyncError> {
        let (resource, err) = failures.first()?;
        Some(SyncError::Refresh {
            failed: failures.len(),
            first: format!("{resource}: {err}"),
        })
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
