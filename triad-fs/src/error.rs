//! Error types for triad-fs.

use std::path::PathBuf;

use thiserror::Error;

use triad_core::{ConfigError, TreeError};
use triad_sync::SyncError;

/// All errors that can arise while assembling or driving a filesystem workspace.
#[derive(Debug, Error)]
pub enum FsError {
    /// A configured root is missing or not a directory.
    #[error("{role} root {path} is not a directory")]
    NotADirectory { role: &'static str, path: PathBuf },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<TreeError> for FsError {
    fn from(err: TreeError) -> Self {
        FsError::Sync(SyncError::from(err))
    }
}
