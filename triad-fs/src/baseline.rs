//! Recording the current working copy as the common ancestor.
//!
//! A baseline replaces every base entry. Resources present in both trees take
//! the mirror's entry with the working copy's revision and modification
//! time; files that exist only locally become additions, and local-only
//! directories get no entry at all. Cached remote state is dropped so the next refresh starts
//! clean.

use std::fs;

use triad_core::error::io_err;
use triad_core::{LocalTree, PropertyKey, PropertyStore, ProgressMonitor, Resource, ResourceKind};
use triad_sync::SyncError;

use crate::error::FsError;
use crate::local::FsLocalTree;
use crate::remote::FsRemoteTree;
use crate::token::{revision_of, FsEntry};

/// Base entry for `resource`, or `None` when it should have none.
///
/// A file's base revision is the digest of the working copy, so a mirror
/// that already differs shows up as an incoming change after a refresh.
fn base_entry(
    local: &FsLocalTree,
    remote: &FsRemoteTree,
    resource: &Resource,
    branch: &str,
) -> Result<Option<FsEntry>, FsError> {
    let mirrored = remote
        .entry(&resource.path, branch)?
        .filter(|entry| entry.kind == resource.kind);
    let stamp = local.modified(resource);
    Ok(match (mirrored, resource.kind) {
        (Some(entry), ResourceKind::Container) => Some(entry.with_local_stamp(stamp)),
        (Some(entry), ResourceKind::File) => {
            let abs = local.path_of(&resource.path);
            let bytes = fs::read(&abs).map_err(|e| io_err(&abs, e))?;
            Some(
                FsEntry {
                    rev: revision_of(&bytes),
                    ..entry
                }
                .with_local_stamp(stamp),
            )
        }
        (None, ResourceKind::File) => Some(FsEntry::addition(stamp, branch)),
        (None, ResourceKind::Container) => None,
    })
}

/// Write base entries for `projects` and everything below them.
///
/// Returns the number of entries written.
pub fn record(
    local: &FsLocalTree,
    remote: &FsRemoteTree,
    store: &dyn PropertyStore,
    keys: (&PropertyKey, &PropertyKey),
    projects: &[Resource],
    branch: &str,
    monitor: &mut dyn ProgressMonitor,
) -> Result<usize, FsError> {
    let (base_key, remote_key) = keys;
    let cleared_base = store.clear(base_key)?;
    let cleared_remote = store.clear(remote_key)?;
    tracing::debug!(cleared_base, cleared_remote, "previous sync state cleared");

    monitor.begin_task("Recording baseline", projects.len() as u32);
    let mut written = 0;
    for project in projects {
        if monitor.is_canceled() {
            return Err(SyncError::Canceled.into());
        }
        monitor.sub_task(project.name());
        let mut resources = vec![project.clone()];
        local.walk(project, &mut resources)?;
        for resource in &resources {
            if let Some(entry) = base_entry(local, remote, resource, branch)? {
                store.set(base_key, resource, Some(entry.encode().into_bytes()))?;
                written += 1;
            }
        }
        monitor.worked(1);
    }
    monitor.done();
    Ok(written)
}
