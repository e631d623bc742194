//! Durable record of the last fully synchronized revision

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sync_vcs::Revision;

use crate::error::{Error, Result};

/// Reads and writes the plain-text revision checkpoint.
///
/// The record is written only after a pass has fully succeeded; a missing
/// or empty record means "never synchronized" and reads as `0`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last synchronized revision, `0` when the record is missing or empty.
    ///
    /// Non-empty content that is not a revision number is an error rather
    /// than a silent `0`, so a damaged record cannot trigger a full
    /// re-bootstrap upload.
    pub fn read(&self) -> Result<Revision> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(Error::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed.parse().map_err(|_| Error::CorruptCheckpoint {
            path: self.path.clone(),
            content: trimmed.to_string(),
        })
    }

    /// Overwrite the record with `revision`.
    ///
    /// Writes to a locked temp file in the same directory and renames it
    /// into place, so a concurrent reader never observes a partial value.
    pub fn write(&self, revision: Revision) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let temp_name = format!(
            ".{}.{}.tmp",
            self.path
                .file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default(),
            std::process::id()
        );
        let temp_path = self.path.with_file_name(&temp_name);
        let io_err = |source| Error::Io {
            path: temp_path.clone(),
            source,
        };

        let mut temp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(io_err)?;

        temp_file.lock_exclusive().map_err(io_err)?;
        temp_file
            .write_all(format!("{revision}\n").as_bytes())
            .map_err(io_err)?;
        temp_file.sync_all().map_err(io_err)?;
        temp_file.unlock().map_err(io_err)?;

        fs::rename(&temp_path, &self.path).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!(revision, path = %self.path.display(), "checkpoint written");
        Ok(())
    }
}
