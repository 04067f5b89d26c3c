//! Triad core library: resource model, collaborator traits, configuration.
//!
//! Public API surface:
//! - [`types`]: paths, resources, depth, opaque sync tokens
//! - [`tree`]: local/remote tree accessors and the property store contract
//! - [`token`]: [`TokenPolicy`], the backend's interpretation of tokens
//! - [`monitor`]: progress monitors with cancellation
//! - [`config`]: per-subscriber YAML configuration
//! - [`error`]: [`TreeError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod monitor;
pub mod token;
pub mod tree;
pub mod types;

pub use config::SubscriberConfig;
pub use error::{ConfigError, TreeError};
pub use monitor::{CancelFlag, NullMonitor, ProgressMonitor, SubMonitor};
pub use token::TokenPolicy;
pub use tree::{
    ContentSource, ContentStream, LocalContent, LocalTree, PropertyKey, PropertyStore,
    RemoteHandle, RemoteTree,
};
pub use types::{Depth, Resource, ResourceKind, ResourcePath, SyncToken};
