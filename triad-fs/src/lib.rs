//! # triad-fs
//!
//! Filesystem backend for the sync engine: a working directory as the local
//! tree, a mirror directory as the remote, and JSON tokens carrying content
//! digests.
//!
//! Open a subscriber with [`FsWorkspace::open_at`], record a common ancestor
//! with [`FsWorkspace::baseline`], then [`FsWorkspace::refresh`] and
//! [`FsWorkspace::status`].

pub mod baseline;
pub mod error;
pub mod local;
pub mod remote;
pub mod token;
pub mod workspace;

pub use error::FsError;
pub use local::FsLocalTree;
pub use remote::{FsRemoteHandle, FsRemoteTree, DEFAULT_BRANCH};
pub use token::{revision_of, FsEntry, FsTokenPolicy};
pub use workspace::{base_key, remote_key, FsWorkspace};
