//! A mirror directory as the [`RemoteTree`].
//!
//! Each file's revision is a digest of its bytes; containers carry only
//! their branch. Handles built from cached tokens never touch metadata and
//! serve content only while the mirror still holds the recorded revision.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use triad_core::error::io_err;
use triad_core::{
    ContentSource, ContentStream, ProgressMonitor, RemoteHandle, RemoteTree, Resource,
    ResourceKind, ResourcePath, SyncToken, TreeError,
};

use crate::token::{revision_of, FsEntry};

/// Branch recorded when no selector is configured.
pub const DEFAULT_BRANCH: &str = "HEAD";

pub struct FsRemoteTree {
    root: PathBuf,
}

impl FsRemoteTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, resource: &ResourcePath) -> PathBuf {
        resource.segments().fold(self.root.clone(), |p, s| p.join(s))
    }

    /// Current entry for whatever the mirror holds at `path`.
    pub fn entry(&self, path: &ResourcePath, branch: &str) -> Result<Option<FsEntry>, TreeError> {
        entry_at(&self.path_of(path), branch)
    }
}

fn entry_at(abs: &Path, branch: &str) -> Result<Option<FsEntry>, TreeError> {
    let meta = match fs::metadata(abs) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(abs, e)),
    };
    if meta.is_dir() {
        return Ok(Some(FsEntry::container(branch)));
    }
    let bytes = fs::read(abs).map_err(|e| io_err(abs, e))?;
    let stamp = meta.modified().ok().map(DateTime::<Utc>::from);
    Ok(Some(FsEntry::file(revision_of(&bytes), stamp, branch)))
}

impl RemoteTree for FsRemoteTree {
    fn fetch(
        &self,
        resource: &Resource,
        selector: Option<&str>,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Option<Arc<dyn RemoteHandle>>, TreeError> {
        if monitor.is_canceled() {
            return Err(TreeError::Canceled);
        }
        let branch = selector.unwrap_or(DEFAULT_BRANCH);
        let abs = self.path_of(&resource.path);
        let Some(entry) = entry_at(&abs, branch)? else {
            return Ok(None);
        };
        Ok(Some(Arc::new(FsRemoteHandle::new(abs, entry, false))))
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
        let entry = FsEntry::decode(token).ok_or_else(|| TreeError::MalformedToken {
            path: resource.path.clone(),
            message: "not a filesystem sync token".into(),
        })?;
        let abs = self.path_of(&resource.path);
        Ok(Some(Arc::new(FsRemoteHandle::new(abs, entry, true))))
    }
}

/// One mirror node.
pub struct FsRemoteHandle {
    abs: PathBuf,
    name: String,
    entry: FsEntry,
    /// Rebuilt from a token: content must still match `entry.rev`.
    pinned: bool,
}

impl FsRemoteHandle {
    fn new(abs: PathBuf, entry: FsEntry, pinned: bool) -> Self {
        let name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            abs,
            name,
            entry,
            pinned,
        }
    }

    pub fn entry(&self) -> &FsEntry {
        &self.entry
    }
}

impl RemoteHandle for FsRemoteHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        self.entry.kind
    }

    fn members(&self, monitor: &mut dyn ProgressMonitor) -> Result<Vec<Arc<dyn RemoteHandle>>, TreeError> {
        if !self.is_container() {
            return Ok(Vec::new());
        }
        let entries = match fs::read_dir(&self.abs) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.abs, e)),
        };
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry.map_err(|e| io_err(&self.abs, e))?.path());
        }
        paths.sort();

        monitor.begin_task("", paths.len() as u32);
        let mut members: Vec<Arc<dyn RemoteHandle>> = Vec::with_capacity(paths.len());
        for path in paths {
            if monitor.is_canceled() {
                return Err(TreeError::Canceled);
            }
            if let Some(entry) = entry_at(&path, &self.entry.branch)? {
                members.push(Arc::new(FsRemoteHandle::new(path, entry, false)));
            }
            monitor.worked(1);
        }
        monitor.done();
        Ok(members)
    }

    fn sync_token(&self) -> SyncToken {
        self.entry.encode()
    }

    fn as_content(&self) -> &dyn ContentSource {
        self
    }
}

impl ContentSource for FsRemoteHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> io::Result<Option<ContentStream>> {
        if self.entry.kind == ResourceKind::Container {
            return Ok(None);
        }
        let bytes = match fs::read(&self.abs) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound && !self.pinned => return Ok(None),
            Err(e) => return Err(e),
        };
        if self.pinned && revision_of(&bytes) != self.entry.rev {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("revision {} of {} is no longer available", self.entry.rev, self.name),
            ));
        }
        Ok(Some(Box::new(io::Cursor::new(bytes))))
    }

    fn modified(&self) -> Option<DateTime<Utc>> {
        self.entry.stamp
    }
}
