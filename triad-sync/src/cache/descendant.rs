use std::sync::Arc;

use triad_core::{Depth, Resource, SyncToken, TokenPolicy};

use super::{FallbackLayer, SyncCache};
use crate::error::SyncError;

/// Top cache layer: hides cached remote state that does not supersede the
/// base, and flags files cached beneath an uncached parent.
pub struct DescendantLayer {
    inner: FallbackLayer,
    policy: Arc<dyn TokenPolicy>,
}

impl DescendantLayer {
    pub fn new(inner: FallbackLayer, policy: Arc<dyn TokenPolicy>) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &Arc<dyn TokenPolicy> {
        &self.policy
    }

    /// Last committed token for `resource`, ignoring any remote override.
    pub fn base_token(&self, resource: &Resource) -> Result<Option<SyncToken>, SyncError> {
        self.inner.base().get(resource)
    }

    /// Cached remote token, without falling back to the base.
    pub fn remote_token(&self, resource: &Resource) -> Result<Option<SyncToken>, SyncError> {
        self.inner.remote().get(resource)
    }

    /// Whether `remote` supersedes `base`. Containers always do; files only
    /// when `remote` is a same-branch revision no older than `base`.
    pub fn is_descendant(&self, resource: &Resource, base: &SyncToken, remote: &SyncToken) -> bool {
        if resource.is_container() {
            return true;
        }
        self.policy.is_later_revision_on_same_branch(base, remote)
    }

    fn warn_if_orphaned(&self, resource: &Resource) -> Result<(), SyncError> {
        if !resource.is_file() || self.get(resource)?.is_none() {
            return Ok(());
        }
        let Some(parent) = resource.parent() else {
            return Ok(());
        };
        if self.get(&parent)?.is_none() {
            tracing::warn!(
                resource = %resource.path,
                parent = %parent.path,
                "sync token written for a file whose parent has none",
            );
        }
        Ok(())
    }
}

impl SyncCache for DescendantLayer {
    fn get(&self, resource: &Resource) -> Result<Option<SyncToken>, SyncError> {
        if let (Some(base), Some(remote)) = (self.base_token(resource)?, self.remote_token(resource)?) {
            if !self.is_descendant(resource, &base, &remote) {
                return Ok(Some(base));
            }
        }
        self.inner.get(resource)
    }

    fn set(&self, resource: &Resource, token: &SyncToken) -> Result<bool, SyncError> {
        let changed = self.inner.set(resource, token)?;
        self.warn_if_orphaned(resource)?;
        Ok(changed)
    }

    fn mark_absent(&self, resource: &Resource) -> Result<bool, SyncError> {
        self.inner.mark_absent(resource)
    }

    fn remove(&self, resource: &Resource, depth: Depth) -> Result<bool, SyncError> {
        self.inner.remove(resource, depth)
    }

    fn members(&self, resource: &Resource) -> Result<Vec<Resource>, SyncError> {
        self.inner.members(resource)
    }
}
