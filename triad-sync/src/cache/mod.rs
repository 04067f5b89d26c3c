//! Layered sync-token cache.
//!
//! ```text
//! DescendantLayer        isDescendant filter, parent/child structure warning
//!   └─ FallbackLayer     remote override, falls back to base, dedups against it
//!        ├─ PersistentLayer   remote tokens + "known absent" tombstones
//!        └─ BaseLayer         read-only, derived from raw local entries
//! ```
//!
//! Each layer implements [`SyncCache`] and wraps the ones below it; none of
//! them lock. Callers that mutate must hold a coordinator scope covering the
//! resource.

mod base;
mod descendant;
mod fallback;
mod persistent;

pub use base::BaseLayer;
pub use descendant::DescendantLayer;
pub use fallback::FallbackLayer;
pub use persistent::PersistentLayer;

use triad_core::{Depth, Resource, SyncToken};

use crate::error::SyncError;

/// One tier of the sync-token cache.
pub trait SyncCache: Send + Sync {
    fn get(&self, resource: &Resource) -> Result<Option<SyncToken>, SyncError>;

    /// Store a token; returns whether the observable state changed.
    fn set(&self, resource: &Resource, token: &SyncToken) -> Result<bool, SyncError>;

    /// Record that the remote counterpart is known not to exist.
    fn mark_absent(&self, resource: &Resource) -> Result<bool, SyncError>;

    /// Forget cached state for `resource` down to `depth`.
    fn remove(&self, resource: &Resource, depth: Depth) -> Result<bool, SyncError>;

    /// Children holding cached state. Always empty for files.
    fn members(&self, resource: &Resource) -> Result<Vec<Resource>, SyncError>;
}
