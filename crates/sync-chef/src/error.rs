//! Error types for sync-chef

/// Result type for sync-chef operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sync-chef operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The upload-client binary could not be launched
    #[error("Failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The upload-client command exited with a non-zero status
    #[error("Command '{command}' exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },
}
