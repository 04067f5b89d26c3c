use std::collections::BTreeSet;

use triad_core::{Depth, Resource, SyncToken};

use super::{BaseLayer, PersistentLayer, SyncCache};
use crate::error::SyncError;

/// Remote overrides on top of the base layer.
///
/// Reads fall back to the base token when no remote state is cached. Writes
/// that would merely restate the base revision (or, for absence, restate that
/// there is no base) drop the override instead of storing a duplicate.
pub struct FallbackLayer {
    remote: PersistentLayer,
    base: BaseLayer,
}

impl FallbackLayer {
    pub fn new(remote: PersistentLayer, base: BaseLayer) -> Self {
        Self { remote, base }
    }

    pub fn base(&self) -> &BaseLayer {
        &self.base
    }

    pub fn remote(&self) -> &PersistentLayer {
        &self.remote
    }
}

impl SyncCache for FallbackLayer {
    fn get(&self, resource: &Resource) -> Result<Option<SyncToken>, SyncError> {
        let remote = self.remote.get(resource)?;
        if remote.is_some() {
            return Ok(remote);
        }
        let Some(base) = self.base.get(resource)? else {
            return Ok(None);
        };
        if self.remote.is_variant_known(resource)? {
            // The remote was seen and is gone.
            return Ok(None);
        }
        Ok(Some(base))
    }

    fn set(&self, resource: &Resource, token: &SyncToken) -> Result<bool, SyncError> {
        if let Some(base) = self.base.get(resource)? {
            if self.base.policy().revision_eq(&base, token) {
                return self.remote.remove(resource, Depth::Zero);
            }
        }
        self.remote.set(resource, token)
    }

    fn mark_absent(&self, resource: &Resource) -> Result<bool, SyncError> {
        if self.base.get(resource)?.is_none() {
            return self.remote.remove(resource, Depth::Zero);
        }
        self.remote.mark_absent(resource)
    }

    fn remove(&self, resource: &Resource, depth: Depth) -> Result<bool, SyncError> {
        self.remote.remove(resource, depth)
    }

    fn members(&self, resource: &Resource) -> Result<Vec<Resource>, SyncError> {
        if resource.is_file() {
            return Ok(Vec::new());
        }
        let mut members: BTreeSet<Resource> = self.base.members(resource)?.into_iter().collect();
        members.extend(self.remote.members(resource)?);
        Ok(members.into_iter().collect())
    }
}
