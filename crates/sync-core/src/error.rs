//! Error types for sync-core

use std::path::PathBuf;

/// Result type for sync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a sync pass.
///
/// Each external transition of the pass has its own variant so callers can
/// tell exactly which step failed; `exit_code` maps them to the stable
/// process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wholesale checkout of the repository failed
    #[error("Repository checkout failed: {source}")]
    Checkout {
        #[source]
        source: sync_vcs::Error,
    },

    /// Working-copy cleanup/revert failed
    #[error("Repository cleanup failed: {source}")]
    Cleanup {
        #[source]
        source: sync_vcs::Error,
    },

    /// Working-copy update failed
    #[error("Repository update failed: {source}")]
    Update {
        #[source]
        source: sync_vcs::Error,
    },

    /// Revision or diff-summary query against the working copy failed
    #[error("Revision query failed: {source}")]
    RevisionQuery {
        #[source]
        source: sync_vcs::Error,
    },

    /// Batched cookbook upload failed
    #[error("Cookbook upload failed: {source}")]
    CookbookUpload {
        #[source]
        source: sync_chef::Error,
    },

    /// Deleting a single cookbook failed
    #[error("Deleting cookbook '{name}' failed: {source}")]
    CookbookDelete {
        name: String,
        #[source]
        source: sync_chef::Error,
    },

    /// Batched role upload failed
    #[error("Role upload failed: {source}")]
    RoleUpload {
        #[source]
        source: sync_chef::Error,
    },

    /// Deleting a single role failed
    #[error("Deleting role '{name}' failed: {source}")]
    RoleDelete {
        name: String,
        #[source]
        source: sync_chef::Error,
    },

    /// Checkpoint file exists but does not hold a revision number
    #[error("Checkpoint at {path} is not a revision number: {content:?}")]
    CorruptCheckpoint { path: PathBuf, content: String },

    /// A run-point hook command failed
    #[error("Hook '{point}' failed running '{command}': {message}")]
    HookFailed {
        point: String,
        command: String,
        message: String,
    },

    /// A configuration file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required configuration value is absent from every source
    #[error("Missing required configuration value '{field}'")]
    MissingConfig { field: &'static str },

    /// Filesystem error with path context
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Stable process exit code for this failure.
    ///
    /// The eight externally-attributed transitions keep their historical
    /// codes; everything else maps to 9.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Checkout { .. } => 1,
            Self::Cleanup { .. } => 2,
            Self::Update { .. } => 3,
            Self::RevisionQuery { .. } => 4,
            Self::CookbookUpload { .. } => 5,
            Self::CookbookDelete { .. } => 6,
            Self::RoleUpload { .. } => 7,
            Self::RoleDelete { .. } => 8,
            _ => 9,
        }
    }
}
