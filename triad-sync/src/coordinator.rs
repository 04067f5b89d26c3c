//! Per-thread reentrant scope locking with batched flushing.
//!
//! A thread acquires a [`SchedulingRule`]; the rule is widened to the
//! projects it touches (or to a no-op for the whole workspace) and pushed on
//! that thread's stack. Nested acquires never block the owning thread.
//! Changes recorded while a scope is held accumulate in the thread's
//! [`ChangeSet`] and are handed to its [`FlushOperation`] once, when the last
//! real lock on the stack is about to be released.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use triad_core::{ProgressMonitor, Resource};

use crate::error::SyncError;

/// How often a blocked acquire re-checks its monitor for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Rules and tokens
// ---------------------------------------------------------------------------

/// Region a caller asks to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingRule {
    /// The whole workspace. Never actually locked.
    Workspace,
    /// A project, by name.
    Project(String),
    /// A single resource; widened to its project.
    Resource(Resource),
    /// Several rules; widened to the distinct projects they touch.
    Multi(Vec<SchedulingRule>),
}

/// The widened rule actually held; returned by `acquire`, handed back to `release`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeToken {
    /// Nothing is locked.
    NoOp,
    Projects(BTreeSet<String>),
}

impl ScopeToken {
    pub fn is_noop(&self) -> bool {
        matches!(self, ScopeToken::NoOp)
    }

    pub fn covers(&self, resource: &Resource) -> bool {
        match (self, resource.path.project()) {
            (ScopeToken::Projects(projects), Some(project)) => projects.contains(project),
            _ => false,
        }
    }
}

fn map_rule(rule: &SchedulingRule) -> ScopeToken {
    let mut projects = BTreeSet::new();
    collect_projects(rule, &mut projects);
    if projects.is_empty() {
        ScopeToken::NoOp
    } else {
        ScopeToken::Projects(projects)
    }
}

fn collect_projects(rule: &SchedulingRule, projects: &mut BTreeSet<String>) {
    match rule {
        SchedulingRule::Workspace => {}
        SchedulingRule::Project(name) => {
            projects.insert(name.clone());
        }
        SchedulingRule::Resource(resource) => {
            if let Some(project) = resource.path.project() {
                projects.insert(project.to_string());
            }
        }
        SchedulingRule::Multi(rules) => {
            for rule in rules {
                collect_projects(rule, projects);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Flushing
// ---------------------------------------------------------------------------

/// Resources and folders changed while a scope was held.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub resources: BTreeSet<Resource>,
    pub folders: BTreeSet<Resource>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.folders.is_empty()
    }
}

/// Persists a drained [`ChangeSet`].
pub trait FlushOperation: Send + Sync {
    fn flush(&self, changes: ChangeSet, monitor: &mut dyn ProgressMonitor) -> Result<(), SyncError>;
}

// ---------------------------------------------------------------------------
// Project locks
// ---------------------------------------------------------------------------

/// Reentrant per-project locks owned by threads.
#[derive(Default)]
struct ProjectLocks {
    held: Mutex<HashMap<String, (ThreadId, usize)>>,
    released: Condvar,
}

impl ProjectLocks {
    fn begin(&self, projects: &BTreeSet<String>, monitor: &mut dyn ProgressMonitor) -> Result<(), SyncError> {
        let me = thread::current().id();
        let mut held = self.held.lock();
        loop {
            if monitor.is_canceled() {
                return Err(SyncError::Canceled);
            }
            let free = projects
                .iter()
                .all(|p| held.get(p).map_or(true, |(owner, _)| *owner == me));
            if free {
                for project in projects {
                    held.entry(project.clone()).or_insert((me, 0)).1 += 1;
                }
                return Ok(());
            }
            self.released.wait_for(&mut held, CANCEL_POLL_INTERVAL);
        }
    }

    fn end(&self, projects: &BTreeSet<String>) {
        let mut held = self.held.lock();
        for project in projects {
            if let Some((_, count)) = held.get_mut(project) {
                *count -= 1;
                if *count == 0 {
                    held.remove(project);
                }
            }
        }
        drop(held);
        self.released.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct ThreadInfo {
    rules: Vec<ScopeToken>,
    changes: ChangeSet,
    operation: Arc<dyn FlushOperation>,
}

impl ThreadInfo {
    /// Every project locked by this thread's stack.
    fn held_projects(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter_map(|rule| match rule {
                ScopeToken::Projects(projects) => Some(projects.iter().cloned()),
                ScopeToken::NoOp => None,
            })
            .flatten()
            .collect()
    }

    /// The real lock goes away when everything below the top is a no-op.
    fn flush_required(&self) -> bool {
        match self.rules.split_last() {
            Some((_, below)) => below.iter().all(ScopeToken::is_noop),
            None => false,
        }
    }
}

/// Registry of per-thread scope stacks plus the project locks they hold.
#[derive(Default)]
pub struct ConcurrencyCoordinator {
    infos: Mutex<HashMap<ThreadId, ThreadInfo>>,
    locks: ProjectLocks,
}

impl ConcurrencyCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `rule` for the current thread.
    ///
    /// The first acquire on a thread binds `operation` as its flush callback;
    /// nested acquires keep the original one. Blocks while another thread
    /// holds an overlapping project, returning `Canceled` if the monitor is
    /// cancelled meanwhile.
    ///
    /// # Panics
    /// When the thread already holds projects and `rule` maps to a project
    /// outside them.
    pub fn acquire(
        &self,
        rule: SchedulingRule,
        operation: Arc<dyn FlushOperation>,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<ScopeToken, SyncError> {
        let me = thread::current().id();
        let token = map_rule(&rule);

        let created = {
            let mut infos = self.infos.lock();
            if let Some(info) = infos.get(&me) {
                // Widening while holding locks could deadlock against another thread.
                if let ScopeToken::Projects(wanted) = &token {
                    let held = info.held_projects();
                    assert!(
                        held.is_empty() || wanted.is_subset(&held),
                        "nested scope {token:?} is not contained in the held projects {held:?}"
                    );
                }
                false
            } else {
                infos.insert(
                    me,
                    ThreadInfo {
                        rules: Vec::new(),
                        changes: ChangeSet::default(),
                        operation,
                    },
                );
                true
            }
        };

        if let ScopeToken::Projects(projects) = &token {
            if let Err(err) = self.locks.begin(projects, monitor) {
                if created {
                    self.infos.lock().remove(&me);
                }
                return Err(err);
            }
        }

        if let Some(info) = self.infos.lock().get_mut(&me) {
            info.rules.push(token.clone());
        }
        tracing::trace!(?token, "scope acquired");
        Ok(token)
    }

    /// Release the innermost scope of the current thread.
    ///
    /// # Panics
    /// When the thread holds no scope or `token` is not the innermost one;
    /// both are caller bugs.
    pub fn release(&self, token: ScopeToken, monitor: &mut dyn ProgressMonitor) {
        let me = thread::current().id();

        let pending = {
            let mut infos = self.infos.lock();
            let Some(info) = infos.get_mut(&me) else {
                panic!("release of {token:?} without a matching acquire");
            };
            info.flush_required()
                .then(|| (info.operation.clone(), std::mem::take(&mut info.changes)))
        };
        if let Some((operation, changes)) = pending {
            run_flush(operation.as_ref(), changes, monitor);
        }

        let popped = {
            let mut infos = self.infos.lock();
            let Some(info) = infos.get_mut(&me) else {
                panic!("release of {token:?} without a matching acquire");
            };
            let popped = info.rules.pop();
            if info.rules.is_empty() {
                infos.remove(&me);
            }
            popped
        };
        assert_eq!(
            popped.as_ref(),
            Some(&token),
            "scope release does not match the innermost acquire"
        );

        if let ScopeToken::Projects(projects) = &token {
            self.locks.end(projects);
        }
        tracing::trace!(?token, "scope released");
    }

    /// Record a changed resource in the current thread's batch.
    pub fn resource_changed(&self, resource: &Resource) -> Result<(), SyncError> {
        let mut infos = self.infos.lock();
        let info = infos
            .get_mut(&thread::current().id())
            .ok_or(SyncError::NoActiveScope)?;
        info.changes.resources.insert(resource.clone());
        Ok(())
    }

    /// Record a changed folder in the current thread's batch.
    pub fn folder_changed(&self, folder: &Resource) -> Result<(), SyncError> {
        let mut infos = self.infos.lock();
        let info = infos
            .get_mut(&thread::current().id())
            .ok_or(SyncError::NoActiveScope)?;
        info.changes.folders.insert(folder.clone());
        Ok(())
    }

    /// Drain the current thread's batch now, without releasing anything.
    pub fn flush(&self, monitor: &mut dyn ProgressMonitor) -> Result<(), SyncError> {
        let (operation, changes) = {
            let mut infos = self.infos.lock();
            let info = infos
                .get_mut(&thread::current().id())
                .ok_or(SyncError::NoActiveScope)?;
            (info.operation.clone(), std::mem::take(&mut info.changes))
        };
        run_flush(operation.as_ref(), changes, monitor);
        Ok(())
    }

    /// Whether any thread currently holds a scope covering `resource`.
    pub fn is_within_active_operation_scope(&self, resource: &Resource) -> bool {
        self.infos
            .lock()
            .values()
            .any(|info| info.rules.iter().any(|rule| rule.covers(resource)))
    }

    /// Depth of the current thread's scope stack.
    pub fn depth(&self) -> usize {
        self.infos
            .lock()
            .get(&thread::current().id())
            .map_or(0, |info| info.rules.len())
    }
}

/// Failures are logged and the batch is dropped; it is never replayed.
fn run_flush(operation: &dyn FlushOperation, changes: ChangeSet, monitor: &mut dyn ProgressMonitor) {
    if let Err(err) = operation.flush(changes, monitor) {
        tracing::error!(error = %err, "flushing sync state failed; pending changes discarded");
    }
}
