//! Collaborator contracts: the local tree, the remote tree, content sources
//! and the per-resource property store backing sync tokens.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::TreeError;
use crate::monitor::ProgressMonitor;
use crate::types::{Resource, ResourceKind, ResourcePath, SyncToken};

/// Readable content stream handed out by a [`ContentSource`].
pub type ContentStream = Box<dyn Read + Send>;

/// Anything whose bytes can be compared: a local file or a remote revision.
pub trait ContentSource: Send + Sync {
    fn name(&self) -> &str;

    /// Open the content. `Ok(None)` means there is no content at all.
    fn open(&self) -> std::io::Result<Option<ContentStream>>;

    /// Modification stamp, when the source knows one.
    fn modified(&self) -> Option<DateTime<Utc>> {
        None
    }
}

// ---------------------------------------------------------------------------
// Local tree
// ---------------------------------------------------------------------------

/// Hierarchical view of the workspace.
pub trait LocalTree: Send + Sync {
    fn exists(&self, resource: &Resource) -> bool;

    /// A placeholder that no longer exists but still carries sync metadata.
    fn is_phantom(&self, resource: &Resource) -> bool;

    fn is_ignored(&self, resource: &Resource) -> bool;

    /// Whether a project is open. Closed projects are skipped by refresh.
    fn is_accessible(&self, project: &Resource) -> bool;

    /// Direct children of a container, including phantoms and ignored members.
    fn members(&self, container: &Resource) -> Result<Vec<Resource>, TreeError>;

    fn read(&self, resource: &Resource) -> std::io::Result<Option<ContentStream>>;

    fn modified(&self, resource: &Resource) -> Option<DateTime<Utc>>;
}

/// [`ContentSource`] view of one local resource.
pub struct LocalContent<'a> {
    tree: &'a dyn LocalTree,
    resource: &'a Resource,
}

impl<'a> LocalContent<'a> {
    pub fn new(tree: &'a dyn LocalTree, resource: &'a Resource) -> Self {
        Self { tree, resource }
    }
}

impl ContentSource for LocalContent<'_> {
    fn name(&self) -> &str {
        self.resource.name()
    }

    fn open(&self) -> std::io::Result<Option<ContentStream>> {
        if !self.tree.exists(self.resource) {
            return Ok(None);
        }
        self.tree.read(self.resource)
    }

    fn modified(&self) -> Option<DateTime<Utc>> {
        self.tree.modified(self.resource)
    }
}

// ---------------------------------------------------------------------------
// Remote tree
// ---------------------------------------------------------------------------

/// One node of the remote tree, valid for a single refresh pass.
pub trait RemoteHandle: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ResourceKind;

    fn is_container(&self) -> bool {
        self.kind() == ResourceKind::Container
    }

    fn members(&self, monitor: &mut dyn ProgressMonitor)
        -> Result<Vec<Arc<dyn RemoteHandle>>, TreeError>;

    /// The token the local cache should hold for this node.
    fn sync_token(&self) -> SyncToken;

    fn as_content(&self) -> &dyn ContentSource;
}

impl fmt::Debug for dyn RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Version-control backend that resolves remote counterparts.
pub trait RemoteTree: Send + Sync {
    /// Fetch the remote counterpart of `resource`, `None` if it does not
    /// exist upstream. `selector` is an optional tag or branch.
    fn fetch(
        &self,
        resource: &Resource,
        selector: Option<&str>,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Option<Arc<dyn RemoteHandle>>, TreeError>;

    /// Rebuild a handle from a cached token without contacting the remote.
    ///
    /// `parent` is the token of the containing folder; files cannot be
    /// resolved without it.
    fn from_token(
        &self,
        resource: &Resource,
        token: &SyncToken,
        parent: Option<&SyncToken>,
    ) -> Result<Option<Arc<dyn RemoteHandle>>, TreeError>;
}

// ---------------------------------------------------------------------------
// Property store
// ---------------------------------------------------------------------------

/// Qualified name under which a subscriber stores one kind of token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey {
    pub qualifier: String,
    pub local: String,
}

impl PropertyKey {
    pub fn new(qualifier: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            local: local.into(),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.qualifier, self.local)
    }
}

/// Physical, per-resource backing store for token bytes.
pub trait PropertyStore: Send + Sync {
    fn get(&self, key: &PropertyKey, path: &ResourcePath) -> Result<Option<Vec<u8>>, TreeError>;

    /// Store (`Some`) or clear (`None`) the value for a resource.
    fn set(
        &self,
        key: &PropertyKey,
        resource: &Resource,
        value: Option<Vec<u8>>,
    ) -> Result<(), TreeError>;

    /// Direct children of `path` that hold a value under `key`.
    fn children(&self, key: &PropertyKey, path: &ResourcePath) -> Result<Vec<Resource>, TreeError>;

    /// Drop every value stored under `key`; returns how many there were.
    fn clear(&self, key: &PropertyKey) -> Result<usize, TreeError>;
}
