//! Backend interpretation of opaque sync tokens.
//!
//! The engine only ever asks the questions on [`TokenPolicy`]; the byte layout
//! of a token belongs to the backend that produced it.

use chrono::{DateTime, Utc};

use crate::types::SyncToken;

/// Predicates a backend answers about its own tokens.
pub trait TokenPolicy: Send + Sync {
    /// The token records a local addition that has never been committed.
    fn is_addition(&self, token: &SyncToken) -> bool;

    /// The token records a local deletion of a committed resource.
    fn is_deletion(&self, token: &SyncToken) -> bool;

    /// The same token with the deletion marker cleared, i.e. the last
    /// committed state of a locally deleted resource.
    fn without_deletion_marker(&self, token: &SyncToken) -> SyncToken;

    /// `remote` is on the same branch as `base` and is not an older revision.
    fn is_later_revision_on_same_branch(&self, base: &SyncToken, remote: &SyncToken) -> bool;

    /// Two tokens name the same revision of the same resource.
    fn revision_eq(&self, a: &SyncToken, b: &SyncToken) -> bool {
        a == b
    }

    /// Local modification stamp recorded when the base was taken, if the
    /// backend keeps one. Lets an unmodified file be recognised without
    /// reading it.
    fn base_timestamp(&self, _token: &SyncToken) -> Option<DateTime<Utc>> {
        None
    }
}
