//! Recursive local/remote merge that keeps the token cache current.
//!
//! A refresh first lists the remote side down to the requested depth, then
//! walks it against the local tree: for each visited resource the engine
//! writes the remote counterpart's token (or records its absence), recurses
//! into the union of local and remote children, then purges cached entries
//! whose names vanished from that union. Writes are incremental: a cancelled
//! walk keeps what it wrote.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use triad_core::{
    Depth, LocalTree, ProgressMonitor, RemoteHandle, RemoteTree, Resource, SubMonitor,
};

use crate::cache::{DescendantLayer, SyncCache};
use crate::coordinator::{ConcurrencyCoordinator, FlushOperation, SchedulingRule};
use crate::error::SyncError;

const FETCH_WORK: u32 = 70;
const COLLECT_WORK: u32 = 30;

/// A remote handle with its members listed down to the refresh depth.
struct RemoteNode {
    handle: Arc<dyn RemoteHandle>,
    children: BTreeMap<String, RemoteNode>,
}

/// A merged child: the local resource plus its remote counterpart, if any.
type Merged<'a> = BTreeMap<String, (Resource, Option<&'a RemoteNode>)>;

pub struct TreeDiffEngine {
    local: Arc<dyn LocalTree>,
    remote: Arc<dyn RemoteTree>,
    cache: Arc<DescendantLayer>,
    coordinator: Arc<ConcurrencyCoordinator>,
    flush: Arc<dyn FlushOperation>,
    selector: Option<String>,
}

impl TreeDiffEngine {
    pub fn new(
        local: Arc<dyn LocalTree>,
        remote: Arc<dyn RemoteTree>,
        cache: Arc<DescendantLayer>,
        coordinator: Arc<ConcurrencyCoordinator>,
        flush: Arc<dyn FlushOperation>,
    ) -> Self {
        Self {
            local,
            remote,
            cache,
            coordinator,
            flush,
            selector: None,
        }
    }

    /// Read the remote at a tag or branch instead of its default line.
    pub fn with_selector(mut self, selector: Option<String>) -> Self {
        self.selector = selector;
        self
    }

    pub fn local(&self) -> &Arc<dyn LocalTree> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteTree> {
        &self.remote
    }

    pub fn cache(&self) -> &Arc<DescendantLayer> {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<ConcurrencyCoordinator> {
        &self.coordinator
    }

    /// `resource` itself, or every local project when it is the workspace root.
    pub fn targets(&self, resource: &Resource) -> Result<Vec<Resource>, SyncError> {
        if !resource.is_root() {
            return Ok(vec![resource.clone()]);
        }
        Ok(self
            .local
            .members(resource)?
            .into_iter()
            .filter(Resource::is_container)
            .collect())
    }

    /// Refresh `resource` down to `depth` and return what changed.
    ///
    /// The workspace root fans out to every local project; a failing project
    /// does not stop the others and the failures are reported together.
    /// Closed projects are skipped with no changes.
    pub fn refresh(
        &self,
        resource: &Resource,
        depth: Depth,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Vec<Resource>, SyncError> {
        if !resource.is_root() {
            return self.refresh_project(resource, depth, monitor);
        }

        let projects = self.targets(resource)?;
        monitor.begin_task("Refreshing workspace", projects.len() as u32);
        let mut changed = Vec::new();
        let mut failures = Vec::new();
        for project in &projects {
            let mut sub = SubMonitor::new(monitor, 1);
            let result = self.refresh_project(project, depth, &mut sub);
            sub.done();
            match result {
                Ok(found) => changed.extend(found),
                Err(err) if err.is_canceled() => return Err(err),
                Err(err) => {
                    tracing::warn!(project = %project, error = %err, "project refresh failed");
                    failures.push((project.clone(), err));
                }
            }
        }
        monitor.done();
        match SyncError::aggregate(&failures) {
            Some(err) => Err(err),
            None => Ok(changed),
        }
    }

    fn refresh_project(
        &self,
        resource: &Resource,
        depth: Depth,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Vec<Resource>, SyncError> {
        if let Some(project) = resource.project() {
            if !self.local.is_accessible(&project) {
                tracing::debug!(project = %project.path, "skipping inaccessible project");
                return Ok(Vec::new());
            }
        }

        let scope = self.coordinator.acquire(
            SchedulingRule::Resource(resource.clone()),
            self.flush.clone(),
            monitor,
        )?;
        let result = self.refresh_in_scope(resource, depth, monitor);
        self.coordinator.release(scope, monitor);
        result
    }

    fn refresh_in_scope(
        &self,
        resource: &Resource,
        depth: Depth,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Vec<Resource>, SyncError> {
        monitor.begin_task(&format!("Refreshing {resource}"), FETCH_WORK + COLLECT_WORK);

        let remote = {
            let mut sub = SubMonitor::new(monitor, FETCH_WORK);
            let remote = match self
                .remote
                .fetch(resource, self.selector.as_deref(), &mut sub)
                .map_err(|e| SyncError::remote(&resource.path, e))?
            {
                Some(handle) => Some(self.build_remote(resource, handle, depth, &mut sub)?),
                None => None,
            };
            sub.done();
            remote
        };
        if monitor.is_canceled() {
            return Err(SyncError::Canceled);
        }

        let mut changed = BTreeSet::new();
        {
            let mut sub = SubMonitor::new(monitor, COLLECT_WORK);
            self.collect_changes(resource, remote.as_ref(), depth, &mut changed, &mut sub)?;
            sub.done();
        }
        monitor.done();

        tracing::info!(resource = %resource, changed = changed.len(), "refreshed");
        Ok(changed.into_iter().collect())
    }

    /// Phase one: list remote members down to `depth` before touching the cache.
    fn build_remote(
        &self,
        resource: &Resource,
        handle: Arc<dyn RemoteHandle>,
        depth: Depth,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<RemoteNode, SyncError> {
        let mut node = RemoteNode {
            handle,
            children: BTreeMap::new(),
        };
        if depth == Depth::Zero || !node.handle.is_container() {
            return Ok(node);
        }
        if monitor.is_canceled() {
            return Err(SyncError::Canceled);
        }
        let members = node
            .handle
            .members(monitor)
            .map_err(|e| SyncError::remote(&resource.path, e))?;
        monitor.begin_task("", members.len() as u32);
        for member in members {
            let name = member.name().to_string();
            let child = resource.child(&name, member.kind());
            let mut sub = SubMonitor::new(monitor, 1);
            let built = self.build_remote(&child, member, depth.descend(), &mut sub)?;
            sub.done();
            node.children.insert(name, built);
        }
        Ok(node)
    }

    /// Phase two: write tokens, recurse, purge.
    fn collect_changes(
        &self,
        resource: &Resource,
        remote: Option<&RemoteNode>,
        depth: Depth,
        changed: &mut BTreeSet<Resource>,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<(), SyncError> {
        if monitor.is_canceled() {
            return Err(SyncError::Canceled);
        }

        if self.update_token(resource, remote.map(|node| &node.handle))? {
            self.record(resource, changed)?;
        }
        if depth == Depth::Zero || resource.is_file() {
            return Ok(());
        }

        let merged = self.merge_children(resource, remote)?;
        monitor.begin_task("", merged.len() as u32);
        for (child, child_remote) in merged.values() {
            let mut sub = SubMonitor::new(monitor, 1);
            self.collect_changes(child, *child_remote, depth.descend(), changed, &mut sub)?;
            sub.done();
        }

        self.purge_stale(resource, &merged, changed)
    }

    /// Step 1: store the candidate token, or the absence of one.
    fn update_token(
        &self,
        resource: &Resource,
        remote: Option<&Arc<dyn RemoteHandle>>,
    ) -> Result<bool, SyncError> {
        let Some(handle) = remote else {
            return self.cache.mark_absent(resource);
        };
        let candidate = handle.sync_token();
        match self.cache.base_token(resource)? {
            Some(base) if !self.cache.is_descendant(resource, &base, &candidate) => {
                tracing::debug!(
                    resource = %resource.path,
                    "remote revision does not supersede base; dropping override",
                );
                self.cache.remove(resource, Depth::Zero)
            }
            _ => self.cache.set(resource, &candidate),
        }
    }

    /// Union by name of non-ignored local children and remote children.
    fn merge_children<'a>(
        &self,
        resource: &Resource,
        remote: Option<&'a RemoteNode>,
    ) -> Result<Merged<'a>, SyncError> {
        let mut merged = Merged::new();

        if self.local.exists(resource) || self.local.is_phantom(resource) {
            for child in self.local.members(resource)? {
                if !self.local.is_ignored(&child) {
                    merged.insert(child.name().to_string(), (child, None));
                }
            }
        }

        for (name, node) in remote.into_iter().flat_map(|node| node.children.iter()) {
            match merged.get_mut(name) {
                Some((_, slot)) => *slot = Some(node),
                None => {
                    let synthesized = resource.child(name, node.handle.kind());
                    merged.insert(name.clone(), (synthesized, Some(node)));
                }
            }
        }
        Ok(merged)
    }

    /// Step 4: drop cached entries whose names are no longer merged.
    fn purge_stale(
        &self,
        resource: &Resource,
        merged: &Merged<'_>,
        changed: &mut BTreeSet<Resource>,
    ) -> Result<(), SyncError> {
        for member in self.cache.members(resource)? {
            if merged.contains_key(member.name()) {
                continue;
            }
            let mut stale = Vec::new();
            self.cached_subtree(&member, &mut stale)?;
            if self.cache.remove(&member, Depth::Infinite)? {
                tracing::debug!(resource = %member.path, "purged stale sync state");
                for gone in &stale {
                    self.record(gone, changed)?;
                }
            }
        }
        Ok(())
    }

    fn cached_subtree(&self, resource: &Resource, out: &mut Vec<Resource>) -> Result<(), SyncError> {
        out.push(resource.clone());
        for member in self.cache.members(resource)? {
            self.cached_subtree(&member, out)?;
        }
        Ok(())
    }

    fn record(&self, resource: &Resource, changed: &mut BTreeSet<Resource>) -> Result<(), SyncError> {
        if resource.is_container() {
            self.coordinator.folder_changed(resource)?;
        } else {
            self.coordinator.resource_changed(resource)?;
        }
        changed.insert(resource.clone());
        Ok(())
    }
}
