//! Versioned JSON sync tokens for the filesystem backend.
//!
//! ```json
//! {"v":1,"kind":"file","rev":"9f86d081884c7d65","stamp":"2024-05-01T10:00:00Z",
//!  "branch":"HEAD","local_stamp":null,"added":false,"deleted":false}
//! ```
//!
//! `rev` is a prefix of the SHA-256 of the content (empty for containers),
//! `stamp` the mirror's modification time, `local_stamp` the working copy's
//! modification time when a base was recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use triad_core::{ResourceKind, SyncToken, TokenPolicy};

/// Current token layout version.
pub const TOKEN_VERSION: u8 = 1;

/// Hex characters of the content digest kept as the revision id.
const REV_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEntry {
    pub v: u8,
    pub kind: ResourceKind,
    pub rev: String,
    #[serde(default)]
    pub stamp: Option<DateTime<Utc>>,
    pub branch: String,
    #[serde(default)]
    pub local_stamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub added: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl FsEntry {
    pub fn file(rev: impl Into<String>, stamp: Option<DateTime<Utc>>, branch: impl Into<String>) -> Self {
        Self {
            v: TOKEN_VERSION,
            kind: ResourceKind::File,
            rev: rev.into(),
            stamp,
            branch: branch.into(),
            local_stamp: None,
            added: false,
            deleted: false,
        }
    }

    pub fn container(branch: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Container,
            ..Self::file("", None, branch)
        }
    }

    /// Base entry for a file that exists only locally.
    pub fn addition(local_stamp: Option<DateTime<Utc>>, branch: impl Into<String>) -> Self {
        Self {
            local_stamp,
            added: true,
            ..Self::file("", None, branch)
        }
    }

    pub fn with_local_stamp(mut self, local_stamp: Option<DateTime<Utc>>) -> Self {
        self.local_stamp = local_stamp;
        self
    }

    pub fn encode(&self) -> SyncToken {
        // Serialising a struct of plain fields cannot fail.
        SyncToken::new(serde_json::to_vec(self).unwrap_or_default())
    }

    /// `None` for bytes that are not a token of a known version.
    pub fn decode(token: &SyncToken) -> Option<FsEntry> {
        let entry: FsEntry = serde_json::from_slice(token.as_bytes()).ok()?;
        (entry.v == TOKEN_VERSION).then_some(entry)
    }
}

/// Revision id for `content`.
pub fn revision_of(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let mut rev = hex::encode(digest);
    rev.truncate(REV_LEN);
    rev
}

/// [`TokenPolicy`] over [`FsEntry`] tokens.
///
/// Revisions are content digests, so ordering falls back to the mirror's
/// modification stamps: a remote is "later" when it is on the same branch
/// and either names the same revision or was stamped no earlier.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTokenPolicy;

impl TokenPolicy for FsTokenPolicy {
    fn is_addition(&self, token: &SyncToken) -> bool {
        FsEntry::decode(token).is_some_and(|e| e.added)
    }

    fn is_deletion(&self, token: &SyncToken) -> bool {
        FsEntry::decode(token).is_some_and(|e| e.deleted)
    }

    fn without_deletion_marker(&self, token: &SyncToken) -> SyncToken {
        match FsEntry::decode(token) {
            Some(mut entry) => {
                entry.deleted = false;
                entry.encode()
            }
            None => token.clone(),
        }
    }

    fn is_later_revision_on_same_branch(&self, base: &SyncToken, remote: &SyncToken) -> bool {
        let (Some(base), Some(remote)) = (FsEntry::decode(base), FsEntry::decode(remote)) else {
            return false;
        };
        if base.branch != remote.branch {
            return false;
        }
        if base.rev == remote.rev {
            return true;
        }
        match (base.stamp, remote.stamp) {
            (Some(b), Some(r)) => r >= b,
            _ => true,
        }
    }

    fn revision_eq(&self, a: &SyncToken, b: &SyncToken) -> bool {
        match (FsEntry::decode(a), FsEntry::decode(b)) {
            (Some(a), Some(b)) => a.kind == b.kind && a.rev == b.rev && a.branch == b.branch,
            _ => a == b,
        }
    }

    fn base_timestamp(&self, token: &SyncToken) -> Option<DateTime<Utc>> {
        FsEntry::decode(token).and_then(|e| e.local_stamp)
    }
}
