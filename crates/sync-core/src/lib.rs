//! Core orchestration layer for cookbook-sync
//!
//! Implements the incremental change-set engine and everything around it:
//!
//! - **CheckpointStore**: durable record of the last synchronized revision
//! - **LockGuard**: at-most-one-active-instance with staleness recovery
//! - **DiffEngine**: revision range to cookbook/role additions and deletions
//! - **SyncRunner**: the linear pass over lock, repository, dispatch, checkpoint
//! - **HookSet**: the five no-op-by-default extension points
//!
//! # Architecture
//!
//! `sync-core` sits between the collaborator crates and the CLI:
//!
//! ```text
//!        sync-cli
//!            |
//!        sync-core
//!        /        \
//!   sync-vcs   sync-chef
//! ```
//!
//! The collaborators stay behind the `VcsClient`/`ServerClient` traits, so
//! the pass logic never touches subprocess output directly.

pub mod changeset;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod lock;

pub use changeset::{ChangeSet, CookbookAdditions, DiffEngine, ROLE_EXTENSIONS};
pub use checkpoint::CheckpointStore;
pub use config::{ConfigFile, ConfigResolver, SyncConfig};
pub use engine::{SyncOptions, SyncOutcome, SyncReport, SyncRunner};
pub use error::{Error, Result};
pub use hooks::{HookCommand, HookPoint, HookSet};
pub use lock::{Acquisition, CleanupHandle, LockGuard, ProcessIdentity};
