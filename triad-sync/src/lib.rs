//! Triad sync engine.
//!
//! Keeps the three-way (base / local / remote) state of a resource tree in a
//! layered token cache so sync questions can be answered without contacting
//! the remote.
//!
//! Public API surface:
//! - [`cache`]: the layered [`SyncCache`](cache::SyncCache)
//! - [`tree_diff`]: [`TreeDiffEngine`], the refresh walk
//! - [`coordinator`]: [`ConcurrencyCoordinator`], scopes and batched flushing
//! - [`subscriber`]: the [`Subscriber`] contract and [`TreeSubscriber`]
//! - [`compare`]: [`ComparisonCriteria`] strategies
//! - [`sync_info`]: [`SyncInfo`] classification
//! - [`store`]: in-memory and JSON-file property stores
//! - [`error`]: [`SyncError`]

pub mod cache;
pub mod compare;
pub mod coordinator;
pub mod error;
pub mod store;
pub mod subscriber;
pub mod sync_info;
pub mod tree_diff;

pub use cache::{BaseLayer, DescendantLayer, FallbackLayer, PersistentLayer, SyncCache};
pub use compare::{contents_equal, ComparisonCriteria, ContentComparison, TimestampComparison};
pub use coordinator::{ChangeSet, ConcurrencyCoordinator, FlushOperation, SchedulingRule, ScopeToken};
pub use error::SyncError;
pub use store::{JsonPropertyStore, MemoryPropertyStore, PersistOnFlush};
pub use subscriber::{
    collect_out_of_sync, ChangeFlag, ListenerError, ListenerSet, OutOfSync, Subscriber,
    SubscriberChangeEvent, SubscriberListener, TreeSubscriber,
};
pub use sync_info::{ChangeType, SyncInfo, SyncKind};
pub use tree_diff::TreeDiffEngine;
