//! The working directory as a [`LocalTree`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use triad_core::tree::ContentStream;
use triad_core::{
    error::io_err, LocalTree, PropertyKey, PropertyStore, Resource, ResourceKind, ResourcePath,
    TreeError,
};

/// Projects are the subdirectories of `root`.
///
/// With a base store attached, resources that have a base entry but are gone
/// from disk are reported as phantoms and listed among their parent's members.
pub struct FsLocalTree {
    root: PathBuf,
    ignore: Vec<String>,
    base: Option<(Arc<dyn PropertyStore>, PropertyKey)>,
}

impl FsLocalTree {
    pub fn new(root: impl Into<PathBuf>, ignore: Vec<String>) -> Self {
        Self {
            root: root.into(),
            ignore,
            base: None,
        }
    }

    pub fn with_phantoms(mut self, store: Arc<dyn PropertyStore>, key: PropertyKey) -> Self {
        self.base = Some((store, key));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a resource.
    pub fn path_of(&self, resource: &ResourcePath) -> PathBuf {
        resource.segments().fold(self.root.clone(), |p, s| p.join(s))
    }

    /// Accessible project directories, sorted by name.
    pub fn projects(&self) -> Result<Vec<Resource>, TreeError> {
        Ok(self
            .members(&Resource::root())?
            .into_iter()
            .filter(|r| r.is_container() && self.exists(r))
            .collect())
    }

    /// Every existing, non-ignored resource below `resource`, depth first.
    pub fn walk(&self, resource: &Resource, out: &mut Vec<Resource>) -> Result<(), TreeError> {
        for child in self.members(resource)? {
            if self.is_ignored(&child) || !self.exists(&child) {
                continue;
            }
            out.push(child.clone());
            if child.is_container() {
                self.walk(&child, out)?;
            }
        }
        Ok(())
    }

    /// Kind of whatever is on disk at `path`, if anything.
    pub fn kind_on_disk(&self, path: &ResourcePath) -> Option<ResourceKind> {
        let meta = fs::metadata(self.path_of(path)).ok()?;
        Some(if meta.is_dir() {
            ResourceKind::Container
        } else {
            ResourceKind::File
        })
    }

    fn has_base(&self, resource: &Resource) -> bool {
        self.base.as_ref().is_some_and(|(store, key)| {
            matches!(store.get(key, &resource.path), Ok(Some(_)))
        })
    }
}

fn matches_pattern(name: &str, pattern: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => name.ends_with(suffix),
        None => name == pattern,
    }
}

impl LocalTree for FsLocalTree {
    fn exists(&self, resource: &Resource) -> bool {
        if resource.is_root() {
            return self.root.is_dir();
        }
        self.kind_on_disk(&resource.path) == Some(resource.kind)
    }

    fn is_phantom(&self, resource: &Resource) -> bool {
        !resource.is_root() && !self.exists(resource) && self.has_base(resource)
    }

    fn is_ignored(&self, resource: &Resource) -> bool {
        let name = resource.name();
        self.ignore.iter().any(|p| matches_pattern(name, p))
    }

    fn is_accessible(&self, project: &Resource) -> bool {
        self.path_of(&project.path).is_dir()
    }

    fn members(&self, container: &Resource) -> Result<Vec<Resource>, TreeError> {
        if container.is_file() {
            return Ok(Vec::new());
        }
        let dir = self.path_of(&container.path);
        let mut members = Vec::new();
        match fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry.map_err(|e| io_err(&dir, e))?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let kind = match entry.file_type() {
                        Ok(t) if t.is_dir() => ResourceKind::Container,
                        Ok(_) => ResourceKind::File,
                        Err(e) => return Err(io_err(entry.path(), e)),
                    };
                    members.push(container.child(&name, kind));
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&dir, e)),
        }

        if let Some((store, key)) = &self.base {
            for known in store.children(key, &container.path)? {
                if !members.iter().any(|m| m.name() == known.name()) {
                    members.push(known);
                }
            }
        }
        members.sort();
        Ok(members)
    }

    fn read(&self, resource: &Resource) -> std::io::Result<Option<ContentStream>> {
        if resource.is_container() {
            return Ok(None);
        }
        match fs::File::open(self.path_of(&resource.path)) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn modified(&self, resource: &Resource) -> Option<DateTime<Utc>> {
        let meta = fs::metadata(self.path_of(&resource.path)).ok()?;
        meta.modified().ok().map(DateTime::<Utc>::from)
    }
}
