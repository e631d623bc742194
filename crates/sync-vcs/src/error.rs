//! Error types for sync-vcs

/// Result type for sync-vcs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sync-vcs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The version-control binary could not be launched
    #[error("Failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The version-control command exited with a non-zero status
    #[error("Command '{command}' exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The revision reported by the working copy could not be parsed
    #[error("Could not parse revision from {output:?}")]
    InvalidRevision { output: String },
}
