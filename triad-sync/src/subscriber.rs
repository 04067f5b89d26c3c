//! The subscriber contract and its tree-backed implementation.
//!
//! A [`Subscriber`] answers sync questions from the cache alone and refreshes
//! the cache on request, telling registered listeners what changed in one
//! batch per call.

use std::collections::BTreeSet;
use std::error::Error;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use triad_core::{
    ContentSource, ContentStream, Depth, LocalContent, ProgressMonitor, RemoteHandle, Resource,
    SubMonitor, SyncToken,
};

use crate::cache::SyncCache;
use crate::compare::{ComparisonCriteria, ContentComparison, TimestampComparison};
use crate::error::SyncError;
use crate::sync_info::{classify, Side, SyncInfo, ThreeWay};
use crate::tree_diff::TreeDiffEngine;

// ---------------------------------------------------------------------------
// Events and listeners
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFlag {
    /// Cached sync state of the resource changed.
    SyncChanged,
    /// The resource became a supervised root.
    RootAdded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberChangeEvent {
    pub subscriber: String,
    pub resource: Resource,
    pub flag: ChangeFlag,
}

pub type ListenerError = Box<dyn Error + Send + Sync>;

pub trait SubscriberListener: Send + Sync {
    fn subscriber_changed(&self, events: &[SubscriberChangeEvent]) -> Result<(), ListenerError>;
}

/// Deduplicated listener registry.
///
/// Dispatch snapshots the set, then delivers outside the lock. A listener
/// that errors or panics is logged and skipped; the rest still receive the
/// batch.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<Arc<dyn SubscriberListener>>>,
}

fn same_listener(a: &Arc<dyn SubscriberListener>, b: &Arc<dyn SubscriberListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn SubscriberListener>) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove(&self, listener: &Arc<dyn SubscriberListener>) {
        self.listeners.lock().retain(|l| !same_listener(l, listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dispatch(&self, events: &[SubscriberChangeEvent]) {
        let snapshot: Vec<_> = self.listeners.lock().clone();
        for listener in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.subscriber_changed(events))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "subscriber listener failed");
                }
                Err(_) => {
                    tracing::error!("subscriber listener panicked");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Result of the optional out-of-sync fast path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutOfSync {
    /// Walk the tree from [`Subscriber::roots`] instead.
    Unsupported,
    Found(Vec<SyncInfo>),
}

pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    fn roots(&self) -> Vec<Resource>;

    /// Cheap, no I/O.
    fn is_supervised(&self, resource: &Resource) -> bool;

    /// Children known locally or implied by cached remote state.
    fn members(&self, resource: &Resource) -> Result<Vec<Resource>, SyncError>;

    /// Classification from cached state. May read content, never the remote.
    fn sync_info(
        &self,
        resource: &Resource,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<SyncInfo, SyncError>;

    /// Refresh cached remote state and notify listeners once.
    fn refresh(
        &self,
        resources: &[Resource],
        depth: Depth,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Vec<Resource>, SyncError>;

    fn add_listener(&self, listener: Arc<dyn SubscriberListener>);

    fn remove_listener(&self, listener: &Arc<dyn SubscriberListener>);

    fn out_of_sync(
        &self,
        _resources: &[Resource],
        _depth: Depth,
        _monitor: &mut dyn ProgressMonitor,
    ) -> Result<OutOfSync, SyncError> {
        Ok(OutOfSync::Unsupported)
    }
}

/// Every out-of-sync resource at or below `resources`.
///
/// Uses the subscriber's fast path when it has one and walks
/// [`Subscriber::members`] otherwise. The workspace root expands to the
/// subscriber's roots.
pub fn collect_out_of_sync(
    subscriber: &dyn Subscriber,
    resources: &[Resource],
    depth: Depth,
    monitor: &mut dyn ProgressMonitor,
) -> Result<Vec<SyncInfo>, SyncError> {
    if let OutOfSync::Found(infos) = subscriber.out_of_sync(resources, depth, monitor)? {
        return Ok(infos);
    }
    let mut out = Vec::new();
    for resource in resources {
        if resource.is_root() {
            for root in subscriber.roots() {
                walk(subscriber, &root, depth, monitor, &mut out)?;
            }
        } else {
            walk(subscriber, resource, depth, monitor, &mut out)?;
        }
    }
    Ok(out)
}

fn walk(
    subscriber: &dyn Subscriber,
    resource: &Resource,
    depth: Depth,
    monitor: &mut dyn ProgressMonitor,
    out: &mut Vec<SyncInfo>,
) -> Result<(), SyncError> {
    if monitor.is_canceled() {
        return Err(SyncError::Canceled);
    }
    let info = subscriber.sync_info(resource, monitor)?;
    if !info.kind.is_in_sync() {
        out.push(info);
    }
    if depth != Depth::Zero {
        for member in subscriber.members(resource)? {
            walk(subscriber, &member, depth.descend(), monitor, out)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TreeSubscriber
// ---------------------------------------------------------------------------

/// Subscriber over a [`TreeDiffEngine`] and its cache.
pub struct TreeSubscriber {
    name: String,
    engine: TreeDiffEngine,
    roots: RwLock<Vec<Resource>>,
    listeners: ListenerSet,
    base_criteria: ContentComparison,
    remote_criteria: Box<dyn ComparisonCriteria>,
}

impl TreeSubscriber {
    pub fn new(name: impl Into<String>, engine: TreeDiffEngine, ignore_whitespace: bool) -> Self {
        Self {
            name: name.into(),
            engine,
            roots: RwLock::new(Vec::new()),
            listeners: ListenerSet::new(),
            base_criteria: ContentComparison::new(ignore_whitespace)
                .with_precondition(TimestampComparison),
            remote_criteria: Box::new(ContentComparison::new(ignore_whitespace)),
        }
    }

    pub fn with_roots(self, roots: impl IntoIterator<Item = Resource>) -> Self {
        self.roots.write().extend(roots);
        self
    }

    /// Replace the criteria used to compare local content with the remote.
    pub fn with_remote_criteria(mut self, criteria: impl ComparisonCriteria + 'static) -> Self {
        self.remote_criteria = Box::new(criteria);
        self
    }

    pub fn engine(&self) -> &TreeDiffEngine {
        &self.engine
    }

    /// Start supervising `root` and tell listeners about it.
    pub fn add_root(&self, root: Resource) -> bool {
        {
            let mut roots = self.roots.write();
            if roots.contains(&root) {
                return false;
            }
            roots.push(root.clone());
        }
        self.listeners.dispatch(&[SubscriberChangeEvent {
            subscriber: self.name.clone(),
            resource: root,
            flag: ChangeFlag::RootAdded,
        }]);
        true
    }

    /// Stop supervising `root`. Removal is not signalled to listeners.
    pub fn remove_root(&self, root: &Resource) -> bool {
        let mut roots = self.roots.write();
        let before = roots.len();
        roots.retain(|r| r != root);
        roots.len() != before
    }

    /// Resolve a remote handle from a cached token without contacting the
    /// remote. Files need a token on their parent.
    fn resolve(
        &self,
        resource: &Resource,
        token: &SyncToken,
        parent: Option<SyncToken>,
    ) -> Result<Option<Arc<dyn RemoteHandle>>, SyncError> {
        if resource.is_file() && parent.is_none() {
            tracing::debug!(resource = %resource.path, "parent has no sync token; remote unresolved");
            return Ok(None);
        }
        Ok(self.engine.remote().from_token(resource, token, parent.as_ref())?)
    }

    fn parent_token(
        &self,
        resource: &Resource,
        lookup: impl Fn(&Resource) -> Result<Option<SyncToken>, SyncError>,
    ) -> Result<Option<SyncToken>, SyncError> {
        match resource.parent() {
            Some(parent) => lookup(&parent),
            None => Ok(None),
        }
    }

    fn notify_sync_changed(&self, changed: &BTreeSet<Resource>) {
        let events: Vec<_> = changed
            .iter()
            .map(|resource| SubscriberChangeEvent {
                subscriber: self.name.clone(),
                resource: resource.clone(),
                flag: ChangeFlag::SyncChanged,
            })
            .collect();
        self.listeners.dispatch(&events);
    }
}

impl Subscriber for TreeSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    fn roots(&self) -> Vec<Resource> {
        self.roots.read().clone()
    }

    fn is_supervised(&self, resource: &Resource) -> bool {
        self.roots
            .read()
            .iter()
            .any(|root| root.path.is_ancestor_of(&resource.path))
            && !self.engine.local().is_ignored(resource)
    }

    fn members(&self, resource: &Resource) -> Result<Vec<Resource>, SyncError> {
        if resource.is_root() {
            return Ok(self.roots());
        }
        if resource.is_file() {
            return Ok(Vec::new());
        }
        let local = self.engine.local();
        let mut members = BTreeSet::new();
        if local.exists(resource) || local.is_phantom(resource) {
            members.extend(
                local
                    .members(resource)?
                    .into_iter()
                    .filter(|child| !local.is_ignored(child)),
            );
        }
        let known: BTreeSet<String> = members.iter().map(|m| m.name().to_string()).collect();
        for cached in self.engine.cache().members(resource)? {
            if !known.contains(cached.name()) {
                members.insert(cached);
            }
        }
        Ok(members.into_iter().collect())
    }

    fn sync_info(
        &self,
        resource: &Resource,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<SyncInfo, SyncError> {
        if !self.is_supervised(resource) {
            return Ok(SyncInfo::in_sync(resource.clone()));
        }
        let cache = self.engine.cache();
        let local_tree = self.engine.local().as_ref();

        let local_exists = local_tree.exists(resource) && !local_tree.is_phantom(resource);
        let local = LocalContent::new(local_tree, resource);

        let base_token = cache.base_token(resource)?;
        let base_handle = match &base_token {
            Some(token) => {
                let parent = self.parent_token(resource, |p| cache.base_token(p))?;
                self.resolve(resource, token, parent)?
            }
            None => None,
        };
        let base_content = base_token.as_ref().map(|token| BaseContent {
            name: resource.name().to_string(),
            handle: base_handle,
            stamp: cache.policy().base_timestamp(token),
        });

        let remote_token = cache.get(resource)?;
        let remote_handle = match &remote_token {
            Some(token) => {
                let parent = self.parent_token(resource, |p| cache.get(p))?;
                self.resolve(resource, token, parent)?
            }
            None => None,
        };

        let input = ThreeWay {
            resource,
            local: local_exists.then_some(&local as &dyn ContentSource),
            base: base_token.zip(base_content.as_ref()).map(|(token, content)| Side {
                token,
                content: content as &dyn ContentSource,
            }),
            remote: remote_token.zip(remote_handle.as_ref()).map(|(token, handle)| Side {
                token,
                content: handle.as_content(),
            }),
        };
        Ok(classify(
            input,
            cache.policy().as_ref(),
            &self.base_criteria,
            self.remote_criteria.as_ref(),
            monitor,
        ))
    }

    fn refresh(
        &self,
        resources: &[Resource],
        depth: Depth,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Vec<Resource>, SyncError> {
        monitor.begin_task(&format!("Refreshing {}", self.name), resources.len() as u32);
        let mut changed = BTreeSet::new();
        let mut failures: Vec<(Resource, SyncError)> = Vec::new();

        for resource in resources {
            let mut sub = SubMonitor::new(monitor, 1);
            let targets = match self.engine.targets(resource) {
                Ok(targets) => targets,
                Err(err) => {
                    tracing::warn!(resource = %resource, error = %err, "refresh failed");
                    failures.push((resource.clone(), err));
                    sub.done();
                    continue;
                }
            };
            sub.begin_task("", targets.len() as u32);
            for target in &targets {
                let mut unit = SubMonitor::new(&mut sub, 1);
                let result = self.engine.refresh(target, depth, &mut unit);
                unit.done();
                match result {
                    Ok(found) => changed.extend(found),
                    Err(err) if err.is_canceled() => {
                        self.notify_sync_changed(&changed);
                        return Err(err);
                    }
                    Err(err) => {
                        tracing::warn!(resource = %target, error = %err, "refresh failed");
                        failures.push((target.clone(), err));
                    }
                }
            }
            sub.done();
        }
        monitor.done();

        self.notify_sync_changed(&changed);
        match SyncError::aggregate(&failures) {
            Some(err) => Err(err),
            None => Ok(changed.into_iter().collect()),
        }
    }

    fn add_listener(&self, listener: Arc<dyn SubscriberListener>) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn SubscriberListener>) {
        self.listeners.remove(listener);
    }
}

/// Last committed content of a resource.
///
/// Carries the local stamp recorded with the base so an untouched file
/// compares equal without a read. Reads go through the handle rebuilt from
/// the base token; without one there is nothing to read.
struct BaseContent {
    name: String,
    handle: Option<Arc<dyn RemoteHandle>>,
    stamp: Option<DateTime<Utc>>,
}

impl ContentSource for BaseContent {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> io::Result<Option<ContentStream>> {
        match &self.handle {
            Some(handle) => handle.as_content().open(),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("base content of {} is unavailable", self.name),
            )),
        }
    }

    fn modified(&self) -> Option<DateTime<Utc>> {
        self.stamp
    }
}
