//! Domain types for the resource tree.
//!
//! A [`Resource`] is a plain value: a normalised path plus a kind. Whether it
//! exists, is a phantom, or is ignored is always answered by the
//! [`LocalTree`](crate::tree::LocalTree), never cached in the value itself.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// A `/`-separated path relative to the workspace root.
///
/// The empty path is the workspace root; the first segment names the project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// The workspace root.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Build a path, dropping empty segments and surrounding slashes.
    ///
    /// `..` removes the previous segment and stops at the root, so a path
    /// never names anything outside the workspace.
    pub fn new(raw: &str) -> Self {
        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other),
            }
        }
        Self(segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Number of segments; the root has depth 0, projects depth 1.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last segment, or `""` for the root.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn parent(&self) -> Option<ResourcePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    pub fn child(&self, name: &str) -> ResourcePath {
        if self.is_root() {
            Self::new(name)
        } else {
            Self::new(&format!("{}/{}", self.0, name))
        }
    }

    /// The project segment, if this path is inside a project.
    pub fn project(&self) -> Option<&str> {
        self.segments().next()
    }

    /// True when `self` is a strict or equal prefix of `other` on segment boundaries.
    pub fn is_ancestor_of(&self, other: &ResourcePath) -> bool {
        if self.is_root() {
            return true;
        }
        other.0 == self.0
            || (other.0.starts_with(&self.0) && other.0.as_bytes().get(self.0.len()) == Some(&b'/'))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        self.0.fmt(f)
    }
}

/// Lets ordered maps keyed by path be searched by string prefix.
impl Borrow<str> for ResourcePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourcePath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourcePath {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// File versus container. The workspace root and projects are containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    File,
    Container,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::File => write!(f, "file"),
            ResourceKind::Container => write!(f, "container"),
        }
    }
}

/// A node in the local resource tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resource {
    pub path: ResourcePath,
    pub kind: ResourceKind,
}

impl Resource {
    pub fn new(path: impl Into<ResourcePath>, kind: ResourceKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn file(path: impl Into<ResourcePath>) -> Self {
        Self::new(path, ResourceKind::File)
    }

    pub fn container(path: impl Into<ResourcePath>) -> Self {
        Self::new(path, ResourceKind::Container)
    }

    pub fn root() -> Self {
        Self::container(ResourcePath::root())
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }

    pub fn is_container(&self) -> bool {
        self.kind == ResourceKind::Container
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn is_project(&self) -> bool {
        self.is_container() && self.path.depth() == 1
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// The containing folder; `None` for the workspace root.
    pub fn parent(&self) -> Option<Resource> {
        self.path.parent().map(Resource::container)
    }

    pub fn child(&self, name: &str, kind: ResourceKind) -> Resource {
        Resource::new(self.path.child(name), kind)
    }

    /// The project this resource belongs to; `None` for the workspace root.
    pub fn project(&self) -> Option<Resource> {
        self.path.project().map(Resource::container)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.fmt(f)?;
        if self.is_container() && !self.is_root() {
            f.write_str("/")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Depth
// ---------------------------------------------------------------------------

/// How far below a resource an operation reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Zero,
    One,
    #[default]
    Infinite,
}

impl Depth {
    /// Depth to use for the children of a resource visited at `self`.
    pub fn descend(self) -> Depth {
        match self {
            Depth::Zero | Depth::One => Depth::Zero,
            Depth::Infinite => Depth::Infinite,
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Zero => write!(f, "zero"),
            Depth::One => write!(f, "one"),
            Depth::Infinite => write!(f, "infinite"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync tokens
// ---------------------------------------------------------------------------

/// Opaque, backend-encoded synchronization state for one resource.
///
/// The engine never looks inside; see [`TokenPolicy`](crate::token::TokenPolicy).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SyncToken(Vec<u8>);

impl SyncToken {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => write!(f, "SyncToken({text:?})"),
            Err(_) => write!(f, "SyncToken({} bytes)", self.0.len()),
        }
    }
}

impl From<Vec<u8>> for SyncToken {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for SyncToken {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for SyncToken {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl AsRef<[u8]> for SyncToken {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
