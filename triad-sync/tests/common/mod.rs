//! In-memory collaborators shared by the triad-sync integration tests.
#![allow(dead_code)]

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use triad_core::{
    ContentSource, ContentStream, LocalTree, ProgressMonitor, PropertyKey, PropertyStore,
    RemoteHandle, RemoteTree, Resource, ResourceKind, ResourcePath, SyncToken, TokenPolicy,
    TreeError,
};
use triad_sync::{
    BaseLayer, ChangeSet, ConcurrencyCoordinator, DescendantLayer, FallbackLayer, FlushOperation,
    MemoryPropertyStore, PersistentLayer, SubscriberChangeEvent, SubscriberListener, SyncError,
    TreeDiffEngine, TreeSubscriber, ListenerError,
};

pub const DIR_TOKEN: &str = "dir";

pub fn base_key() -> PropertyKey {
    PropertyKey::new("test", "base")
}

pub fn remote_key() -> PropertyKey {
    PropertyKey::new("test", "remote")
}

// ---------------------------------------------------------------------------
// Token policy
// ---------------------------------------------------------------------------

/// File tokens read `<rev>@<branch>`, prefixed `+` for a local addition or
/// `-` for a local deletion. Anything else is a folder descriptor.
pub struct TestPolicy;

fn parse(token: &SyncToken) -> Option<(u32, String)> {
    let text = std::str::from_utf8(token.as_bytes()).ok()?;
    let text = text.trim_start_matches(['+', '-']);
    let (rev, branch) = text.split_once('@')?;
    Some((rev.parse().ok()?, branch.to_string()))
}

impl TokenPolicy for TestPolicy {
    fn is_addition(&self, token: &SyncToken) -> bool {
        token.as_bytes().first() == Some(&b'+')
    }

    fn is_deletion(&self, token: &SyncToken) -> bool {
        token.as_bytes().first() == Some(&b'-')
    }

    fn without_deletion_marker(&self, token: &SyncToken) -> SyncToken {
        SyncToken::new(token.as_bytes().strip_prefix(b"-").unwrap_or(token.as_bytes()))
    }

    fn is_later_revision_on_same_branch(&self, base: &SyncToken, remote: &SyncToken) -> bool {
        match (parse(base), parse(remote)) {
            (Some((b, base_branch)), Some((r, remote_branch))) => base_branch == remote_branch && r >= b,
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Local tree
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LocalState {
    nodes: BTreeMap<ResourcePath, (ResourceKind, Vec<u8>)>,
    phantoms: BTreeMap<ResourcePath, ResourceKind>,
    ignored: BTreeSet<String>,
    closed: BTreeSet<String>,
}

#[derive(Default)]
pub struct MemoryLocalTree {
    state: Mutex<LocalState>,
}

impl MemoryLocalTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&self, path: &str) {
        let path = ResourcePath::new(path);
        let mut state = self.state.lock();
        let mut cursor = Some(path);
        while let Some(p) = cursor {
            if p.is_root() {
                break;
            }
            cursor = p.parent();
            state.phantoms.remove(&p);
            state.nodes.entry(p).or_insert((ResourceKind::Container, Vec::new()));
        }
    }

    pub fn add_file(&self, path: &str, content: &str) {
        let path = ResourcePath::new(path);
        if let Some(parent) = path.parent() {
            self.add_dir(parent.as_str());
        }
        let mut state = self.state.lock();
        state.phantoms.remove(&path);
        state
            .nodes
            .insert(path, (ResourceKind::File, content.as_bytes().to_vec()));
    }

    /// Delete a node, leaving a phantom behind.
    pub fn delete(&self, path: &str) {
        let path = ResourcePath::new(path);
        let mut state = self.state.lock();
        if let Some((kind, _)) = state.nodes.remove(&path) {
            state.phantoms.insert(path, kind);
        }
    }

    pub fn ignore(&self, name: &str) {
        self.state.lock().ignored.insert(name.to_string());
    }

    pub fn close(&self, project: &str) {
        self.state.lock().closed.insert(project.to_string());
    }

    pub fn all(&self) -> Vec<Resource> {
        self.state
            .lock()
            .nodes
            .iter()
            .map(|(path, (kind, _))| Resource::new(path.clone(), *kind))
            .collect()
    }
}

impl LocalTree for MemoryLocalTree {
    fn exists(&self, resource: &Resource) -> bool {
        resource.is_root() || self.state.lock().nodes.contains_key(&resource.path)
    }

    fn is_phantom(&self, resource: &Resource) -> bool {
        self.state.lock().phantoms.contains_key(&resource.path)
    }

    fn is_ignored(&self, resource: &Resource) -> bool {
        self.state.lock().ignored.contains(resource.name())
    }

    fn is_accessible(&self, project: &Resource) -> bool {
        !self.state.lock().closed.contains(project.name())
    }

    fn members(&self, container: &Resource) -> Result<Vec<Resource>, TreeError> {
        let state = self.state.lock();
        let is_child = |p: &ResourcePath| p.parent().as_ref() == Some(&container.path);
        let mut out: Vec<Resource> = state
            .nodes
            .iter()
            .filter(|(p, _)| is_child(p))
            .map(|(p, (kind, _))| Resource::new(p.clone(), *kind))
            .collect();
        out.extend(
            state
                .phantoms
                .iter()
                .filter(|(p, _)| is_child(p))
                .map(|(p, kind)| Resource::new(p.clone(), *kind)),
        );
        Ok(out)
    }

    fn read(&self, resource: &Resource) -> std::io::Result<Option<ContentStream>> {
        Ok(self
            .state
            .lock()
            .nodes
            .get(&resource.path)
            .filter(|(kind, _)| *kind == ResourceKind::File)
            .map(|(_, bytes)| Box::new(Cursor::new(bytes.clone())) as ContentStream))
    }

    fn modified(&self, _resource: &Resource) -> Option<chrono::DateTime<chrono::Utc>> {
        None
    }
}

// ---------------------------------------------------------------------------
// Remote tree
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct RemoteNode {
    kind: ResourceKind,
    token: String,
}

#[derive(Default)]
struct RemoteState {
    nodes: BTreeMap<ResourcePath, RemoteNode>,
    /// Content of every file revision ever published.
    history: HashMap<(ResourcePath, String), Vec<u8>>,
    failing: BTreeSet<ResourcePath>,
}

#[derive(Default)]
pub struct MemoryRemoteTree {
    state: Arc<Mutex<RemoteState>>,
    fetches: AtomicUsize,
}

impl MemoryRemoteTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_dir(&self, path: &str) {
        let path = ResourcePath::new(path);
        let mut state = self.state.lock();
        let mut cursor = Some(path);
        while let Some(p) = cursor {
            if p.is_root() {
                break;
            }
            cursor = p.parent();
            state.nodes.entry(p).or_insert(RemoteNode {
                kind: ResourceKind::Container,
                token: DIR_TOKEN.to_string(),
            });
        }
    }

    /// Publish `content` as revision `token` of a file.
    pub fn put_file(&self, path: &str, token: &str, content: &str) {
        let path = ResourcePath::new(path);
        if let Some(parent) = path.parent() {
            self.put_dir(parent.as_str());
        }
        let mut state = self.state.lock();
        state
            .history
            .insert((path.clone(), token.to_string()), content.as_bytes().to_vec());
        state.nodes.insert(
            path,
            RemoteNode {
                kind: ResourceKind::File,
                token: token.to_string(),
            },
        );
    }

    /// Remove a node and everything below it.
    pub fn remove(&self, path: &str) {
        let path = ResourcePath::new(path);
        self.state.lock().nodes.retain(|p, _| !path.is_ancestor_of(p));
    }

    /// Fetching or listing `path` fails from now on.
    pub fn fail(&self, path: &str) {
        self.state.lock().failing.insert(ResourcePath::new(path));
    }

    pub fn token(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(&ResourcePath::new(path))
            .map(|n| n.token.clone())
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn handle(&self, path: ResourcePath, kind: ResourceKind, token: String) -> Arc<dyn RemoteHandle> {
        let content = self
            .state
            .lock()
            .history
            .get(&(path.clone(), token.clone()))
            .cloned();
        Arc::new(MemoryRemoteHandle {
            name: path.name().to_string(),
            path,
            kind,
            token,
            content,
            state: self.state.clone(),
        })
    }
}

impl RemoteTree for MemoryRemoteTree {
    fn fetch(
        &self,
        resource: &Resource,
        _selector: Option<&str>,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Option<Arc<dyn RemoteHandle>>, TreeError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if monitor.is_canceled() {
            return Err(TreeError::Canceled);
        }
        if self.state.lock().failing.contains(&resource.path) {
            return Err(TreeError::Remote {
                path: resource.path.clone(),
                message: "connection reset".into(),
            });
        }
        let node = self.state.lock().nodes.get(&resource.path).cloned();
        Ok(node.map(|n| self.handle(resource.path.clone(), n.kind, n.token)))
    }

    fn from_token(
        &self,
        resource: &Resource,
        token: &SyncToken,
        parent: Option<&SyncToken>,
    ) -> Result<Option<Arc<dyn RemoteHandle>>, TreeError> {
        if resource.is_file() && parent.is_none() {
            return Ok(None);
        }
        let token = String::from_utf8_lossy(token.as_bytes()).into_owned();
        Ok(Some(self.handle(resource.path.clone(), resource.kind, token)))
    }
}

pub struct MemoryRemoteHandle {
    path: ResourcePath,
    name: String,
    kind: ResourceKind,
    token: String,
    content: Option<Vec<u8>>,
    state: Arc<Mutex<RemoteState>>,
}

impl RemoteHandle for MemoryRemoteHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn members(&self, _monitor: &mut dyn ProgressMonitor) -> Result<Vec<Arc<dyn RemoteHandle>>, TreeError> {
        let state = self.state.lock();
        if state.failing.contains(&self.path) {
            return Err(TreeError::Remote {
                path: self.path.clone(),
                message: "listing refused".into(),
            });
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(p, _)| p.parent().as_ref() == Some(&self.path))
            .map(|(p, n)| {
                Arc::new(MemoryRemoteHandle {
                    path: p.clone(),
                    name: p.name().to_string(),
                    kind: n.kind,
                    token: n.token.clone(),
                    content: state.history.get(&(p.clone(), n.token.clone())).cloned(),
                    state: self.state.clone(),
                }) as Arc<dyn RemoteHandle>
            })
            .collect())
    }

    fn sync_token(&self) -> SyncToken {
        SyncToken::from(self.token.as_str())
    }

    fn as_content(&self) -> &dyn ContentSource {
        self
    }
}

impl ContentSource for MemoryRemoteHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> std::io::Result<Option<ContentStream>> {
        match (&self.content, self.kind) {
            (Some(bytes), _) => Ok(Some(Box::new(Cursor::new(bytes.clone())))),
            (None, ResourceKind::Container) => Ok(None),
            (None, ResourceKind::File) => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no content for revision {}", self.token),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Flush, listeners, monitors
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingFlush {
    pub calls: AtomicUsize,
    pub batches: Mutex<Vec<ChangeSet>>,
}

impl FlushOperation for RecordingFlush {
    fn flush(&self, changes: ChangeSet, _monitor: &mut dyn ProgressMonitor) -> Result<(), SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().push(changes);
        Ok(())
    }
}

impl RecordingFlush {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingListener {
    pub batches: Mutex<Vec<Vec<SubscriberChangeEvent>>>,
}

impl SubscriberListener for RecordingListener {
    fn subscriber_changed(&self, events: &[SubscriberChangeEvent]) -> Result<(), ListenerError> {
        self.batches.lock().push(events.to_vec());
        Ok(())
    }
}

/// Reports cancellation from the `limit + 1`-th check on.
pub struct CancelAfter {
    checks: Cell<usize>,
    limit: usize,
}

impl CancelAfter {
    pub fn new(limit: usize) -> Self {
        Self {
            checks: Cell::new(0),
            limit,
        }
    }
}

impl ProgressMonitor for CancelAfter {
    fn begin_task(&mut self, _name: &str, _total_work: u32) {}

    fn worked(&mut self, _work: u32) {}

    fn is_canceled(&self) -> bool {
        let n = self.checks.get() + 1;
        self.checks.set(n);
        n > self.limit
    }

    fn done(&mut self) {}
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

pub struct Fixture {
    pub local: Arc<MemoryLocalTree>,
    pub remote: Arc<MemoryRemoteTree>,
    pub store: Arc<MemoryPropertyStore>,
    pub cache: Arc<DescendantLayer>,
    pub coordinator: Arc<ConcurrencyCoordinator>,
    pub flush: Arc<RecordingFlush>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryPropertyStore::new());
        let policy: Arc<dyn TokenPolicy> = Arc::new(TestPolicy);
        let cache = DescendantLayer::new(
            FallbackLayer::new(
                PersistentLayer::new(store.clone(), remote_key()),
                BaseLayer::new(store.clone(), base_key(), policy.clone()),
            ),
            policy,
        );
        Self {
            local: Arc::new(MemoryLocalTree::new()),
            remote: Arc::new(MemoryRemoteTree::new()),
            store,
            cache: Arc::new(cache),
            coordinator: Arc::new(ConcurrencyCoordinator::new()),
            flush: Arc::new(RecordingFlush::default()),
        }
    }

    pub fn engine(&self) -> TreeDiffEngine {
        TreeDiffEngine::new(
            self.local.clone(),
            self.remote.clone(),
            self.cache.clone(),
            self.coordinator.clone(),
            self.flush.clone(),
        )
    }

    /// Subscriber supervising every local project.
    pub fn subscriber(&self) -> TreeSubscriber {
        let roots: Vec<Resource> = self
            .local
            .members(&Resource::root())
            .unwrap_or_default()
            .into_iter()
            .filter(Resource::is_container)
            .collect();
        TreeSubscriber::new("test", self.engine(), false).with_roots(roots)
    }

    pub fn set_base(&self, resource: &Resource, token: &str) {
        self.store
            .set(&base_key(), resource, Some(token.as_bytes().to_vec()))
            .expect("base write");
    }

    /// Record the current remote revision of every local resource as its
    /// base; local-only files become additions.
    pub fn baseline(&self) {
        for resource in self.local.all() {
            let token = match (self.remote.token(resource.path.as_str()), resource.kind) {
                (Some(token), _) => token,
                (None, ResourceKind::Container) => DIR_TOKEN.to_string(),
                (None, ResourceKind::File) => "+0@main".to_string(),
            };
            self.set_base(&resource, &token);
        }
    }
}

pub fn names(resources: &[Resource]) -> Vec<String> {
    resources.iter().map(|r| r.path.to_string()).collect()
}
