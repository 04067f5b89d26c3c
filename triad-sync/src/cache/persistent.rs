use std::sync::Arc;

use triad_core::{Depth, PropertyKey, PropertyStore, Resource, SyncToken};

use super::SyncCache;
use crate::error::SyncError;

/// Stored in place of a token when the remote is known not to exist.
const ABSENT: &[u8] = b"\0absent";

/// Remote-token layer over a [`PropertyStore`].
///
/// Distinguishes "nothing cached" from "remote known absent" so the layer
/// above can tell a remote deletion apart from a cold cache.
pub struct PersistentLayer {
    store: Arc<dyn PropertyStore>,
    key: PropertyKey,
}

impl PersistentLayer {
    pub fn new(store: Arc<dyn PropertyStore>, key: PropertyKey) -> Self {
        Self { store, key }
    }

    /// Whether anything, including an absence marker, is recorded.
    pub fn is_variant_known(&self, resource: &Resource) -> Result<bool, SyncError> {
        Ok(self.store.get(&self.key, &resource.path)?.is_some())
    }

    fn write(&self, resource: &Resource, bytes: &[u8]) -> Result<bool, SyncError> {
        let current = self.store.get(&self.key, &resource.path)?;
        if current.as_deref() == Some(bytes) {
            return Ok(false);
        }
        self.store.set(&self.key, resource, Some(bytes.to_vec()))?;
        Ok(true)
    }

    /// Direct children with any record, tombstones included.
    fn stored_children(&self, resource: &Resource) -> Result<Vec<Resource>, SyncError> {
        if resource.is_file() {
            return Ok(Vec::new());
        }
        Ok(self.store.children(&self.key, &resource.path)?)
    }
}

impl SyncCache for PersistentLayer {
    fn get(&self, resource: &Resource) -> Result<Option<SyncToken>, SyncError> {
        Ok(self
            .store
            .get(&self.key, &resource.path)?
            .filter(|bytes| bytes.as_slice() != ABSENT)
            .map(SyncToken::new))
    }

    fn set(&self, resource: &Resource, token: &SyncToken) -> Result<bool, SyncError> {
        self.write(resource, token.as_bytes())
    }

    fn mark_absent(&self, resource: &Resource) -> Result<bool, SyncError> {
        self.write(resource, ABSENT)
    }

    fn remove(&self, resource: &Resource, depth: Depth) -> Result<bool, SyncError> {
        let mut changed = false;
        if depth != Depth::Zero {
            for child in self.stored_children(resource)? {
                changed |= self.remove(&child, depth.descend())?;
            }
        }
        if self.store.get(&self.key, &resource.path)?.is_some() {
            self.store.set(&self.key, resource, None)?;
            changed = true;
        }
        Ok(changed)
    }

    fn members(&self, resource: &Resource) -> Result<Vec<Resource>, SyncError> {
        let mut members = Vec::new();
        for child in self.stored_children(resource)? {
            if self.get(&child)?.is_some() {
                members.push(child);
            }
        }
        Ok(members)
    }
}
