use std::sync::Arc;

use triad_core::{Depth, PropertyKey, PropertyStore, Resource, SyncToken, TokenPolicy};

use super::SyncCache;
use crate::error::SyncError;

/// Read-only layer deriving base tokens from raw local entries.
///
/// A raw entry marked as a local addition has no base (nothing was ever
/// committed); one marked as a local deletion yields the committed state
/// with the marker cleared. Containers return their descriptor unchanged.
pub struct BaseLayer {
    store: Arc<dyn PropertyStore>,
    key: PropertyKey,
    policy: Arc<dyn TokenPolicy>,
}

impl BaseLayer {
    pub fn new(store: Arc<dyn PropertyStore>, key: PropertyKey, policy: Arc<dyn TokenPolicy>) -> Self {
        Self { store, key, policy }
    }

    pub fn policy(&self) -> &Arc<dyn TokenPolicy> {
        &self.policy
    }

    /// The raw entry exactly as the backend recorded it.
    pub fn raw(&self, resource: &Resource) -> Result<Option<SyncToken>, SyncError> {
        Ok(self
            .store
            .get(&self.key, &resource.path)?
            .map(SyncToken::new))
    }
}

impl SyncCache for BaseLayer {
    fn get(&self, resource: &Resource) -> Result<Option<SyncToken>, SyncError> {
        let Some(raw) = self.raw(resource)? else {
            return Ok(None);
        };
        if resource.is_container() {
            return Ok(Some(raw));
        }
        if self.policy.is_addition(&raw) {
            return Ok(None);
        }
        if self.policy.is_deletion(&raw) {
            return Ok(Some(self.policy.without_deletion_marker(&raw)));
        }
        Ok(Some(raw))
    }

    fn set(&self, _resource: &Resource, _token: &SyncToken) -> Result<bool, SyncError> {
        Err(SyncError::ReadOnlyLayer { layer: "base" })
    }

    fn mark_absent(&self, _resource: &Resource) -> Result<bool, SyncError> {
        Err(SyncError::ReadOnlyLayer { layer: "base" })
    }

    fn remove(&self, _resource: &Resource, _depth: Depth) -> Result<bool, SyncError> {
        Err(SyncError::ReadOnlyLayer { layer: "base" })
    }

    fn members(&self, resource: &Resource) -> Result<Vec<Resource>, SyncError> {
        if resource.is_file() {
            return Ok(Vec::new());
        }
        Ok(self.store.children(&self.key, &resource.path)?)
    }
}
