//! Assembly of a filesystem-backed subscriber from its configuration.

use std::path::Path;
use std::sync::Arc;

use triad_core::{
    Depth, PropertyKey, ProgressMonitor, Resource, ResourceKind, ResourcePath,
    SubscriberConfig, TokenPolicy,
};
use triad_sync::{
    collect_out_of_sync, BaseLayer, ConcurrencyCoordinator, DescendantLayer, FallbackLayer,
    FlushOperation, JsonPropertyStore, PersistOnFlush, PersistentLayer, SchedulingRule, Subscriber,
    SyncInfo, TreeDiffEngine, TreeSubscriber,
};

use crate::baseline;
use crate::error::FsError;
use crate::local::FsLocalTree;
use crate::remote::{FsRemoteTree, DEFAULT_BRANCH};
use crate::token::FsTokenPolicy;

/// Key of the last committed state.
pub fn base_key() -> PropertyKey {
    PropertyKey::new("triad", "base")
}

/// Key of cached remote state that differs from the base.
pub fn remote_key() -> PropertyKey {
    PropertyKey::new("triad", "remote")
}

/// A subscriber over a working directory and a mirror directory, with its
/// sync state persisted under `<home>/.triad/tokens/<name>.json`.
pub struct FsWorkspace {
    config: SubscriberConfig,
    store: Arc<JsonPropertyStore>,
    local: Arc<FsLocalTree>,
    remote: Arc<FsRemoteTree>,
    flush: Arc<dyn FlushOperation>,
    subscriber: TreeSubscriber,
}

fn require_dir(role: &'static str, path: &Path) -> Result<(), FsError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(FsError::NotADirectory {
            role,
            path: path.to_path_buf(),
        })
    }
}

impl FsWorkspace {
    pub fn open_at(
        home: &Path,
        config: SubscriberConfig,
        coordinator: Arc<ConcurrencyCoordinator>,
    ) -> Result<Self, FsError> {
        require_dir("local", &config.local_root)?;
        require_dir("remote", &config.remote_root)?;

        let store = Arc::new(JsonPropertyStore::load_at(home, &config.name)?);
        let policy: Arc<dyn TokenPolicy> = Arc::new(FsTokenPolicy);
        let local = Arc::new(
            FsLocalTree::new(&config.local_root, config.ignore.clone())
                .with_phantoms(store.clone(), base_key()),
        );
        let remote = Arc::new(FsRemoteTree::new(&config.remote_root));

        let cache = DescendantLayer::new(
            FallbackLayer::new(
                PersistentLayer::new(store.clone(), remote_key()),
                BaseLayer::new(store.clone(), base_key(), policy.clone()),
            ),
            policy,
        );
        let flush: Arc<dyn FlushOperation> = Arc::new(PersistOnFlush::new(store.clone()));
        let engine = TreeDiffEngine::new(
            local.clone(),
            remote.clone(),
            Arc::new(cache),
            coordinator,
            flush.clone(),
        )
        .with_selector(config.selector.clone());

        let projects = local.projects()?;
        tracing::debug!(
            subscriber = %config.name,
            projects = projects.len(),
            store = %store.path().display(),
            "workspace opened",
        );
        let subscriber = TreeSubscriber::new(config.name.clone(), engine, config.ignore_whitespace)
            .with_roots(projects);

        Ok(Self {
            config,
            store,
            local,
            remote,
            flush,
            subscriber,
        })
    }

    /// Open with the home directory of the current user.
    pub fn open(config: SubscriberConfig, coordinator: Arc<ConcurrencyCoordinator>) -> Result<Self, FsError> {
        let home = triad_core::config::home()?;
        Self::open_at(&home, config, coordinator)
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    pub fn subscriber(&self) -> &TreeSubscriber {
        &self.subscriber
    }

    pub fn store(&self) -> &Arc<JsonPropertyStore> {
        &self.store
    }

    fn branch(&self) -> &str {
        self.config.selector.as_deref().unwrap_or(DEFAULT_BRANCH)
    }

    /// Record the current working copy as the base of every project.
    ///
    /// Holds every project for the duration and persists the store before
    /// returning. Returns the number of base entries written.
    pub fn baseline(&self, monitor: &mut dyn ProgressMonitor) -> Result<usize, FsError> {
        let projects = self.local.projects()?;
        let rule = SchedulingRule::Multi(
            projects
                .iter()
                .map(|p| SchedulingRule::Project(p.name().to_string()))
                .collect(),
        );
        let coordinator = self.subscriber.engine().coordinator();
        let token = coordinator.acquire(rule, self.flush.clone(), monitor)?;

        let (base, remote) = (base_key(), remote_key());
        let result = baseline::record(
            &self.local,
            &self.remote,
            self.store.as_ref(),
            (&base, &remote),
            &projects,
            self.branch(),
            monitor,
        )
        .and_then(|written| {
            for project in &projects {
                coordinator.folder_changed(project)?;
            }
            Ok(written)
        });
        coordinator.release(token, monitor);
        let written = result?;

        // The flush logs and drops its own failures; surface them here.
        self.store.save()?;
        tracing::info!(subscriber = %self.config.name, entries = written, "baseline recorded");
        Ok(written)
    }

    /// Refresh remote state; see [`Subscriber::refresh`].
    pub fn refresh(
        &self,
        resources: &[Resource],
        depth: Depth,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Vec<Resource>, FsError> {
        let changed = self.subscriber.refresh(resources, depth, monitor)?;
        self.store.save()?;
        Ok(changed)
    }

    /// Every out-of-sync resource under the supervised projects.
    pub fn status(&self, monitor: &mut dyn ProgressMonitor) -> Result<Vec<SyncInfo>, FsError> {
        Ok(collect_out_of_sync(
            &self.subscriber,
            &[Resource::root()],
            Depth::Infinite,
            monitor,
        )?)
    }

    /// Resolve a workspace-relative path to a typed resource.
    ///
    /// The working copy decides the kind; paths that exist only in the mirror
    /// take the mirror's kind, and unknown paths are treated as files.
    pub fn resource(&self, path: &str) -> Result<Resource, FsError> {
        let path = ResourcePath::new(path);
        if path.is_root() {
            return Ok(Resource::root());
        }
        if let Some(kind) = self.local.kind_on_disk(&path) {
            return Ok(Resource::new(path, kind));
        }
        let kind = self
            .remote
            .entry(&path, self.branch())?
            .map(|entry| entry.kind)
            .unwrap_or(ResourceKind::File);
        Ok(Resource::new(path, kind))
    }
}
