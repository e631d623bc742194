//! Collaborator trait for version-control operations

use crate::Result;

/// A repository revision number. `0` is reserved for "no revision".
pub type Revision = u64;

/// Kind of change reported for a single path in a diff summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Path was added within the revision range
    Added,
    /// Path content was modified
    Modified,
    /// Path was deleted
    Deleted,
    /// Path was replaced (deleted and re-added at the same revision)
    Replaced,
}

/// One entry of a structured diff summary.
///
/// `path` is relative to the subtree the summary was scoped to, so a
/// deletion of a top-level entry carries no path separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub kind: ChangeKind,
    pub path: String,
}

impl DiffEntry {
    pub fn new(kind: ChangeKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Trait for version-control operations against a single working copy.
///
/// All revision-range queries run against the *local* working copy, never
/// the remote head, so results only ever reflect state that has already
/// been materialized on disk.
pub trait VcsClient {
    /// Whether the configured working-copy path holds a checked-out copy
    fn is_working_copy(&self) -> bool;

    /// Check out the configured repository URL wholesale
    fn checkout(&self) -> Result<()>;

    /// Clear stale write locks and revert local edits
    fn cleanup(&self) -> Result<()>;

    /// Update the working copy to the repository head
    fn update(&self) -> Result<()>;

    /// Revision currently checked out in the working copy
    fn current_revision(&self) -> Result<Revision>;

    /// Structured diff summary for `old:new`, scoped to `subtree`
    /// (a path relative to the working-copy root)
    fn diff_summary(&self, old: Revision, new: Revision, subtree: &str) -> Result<Vec<DiffEntry>>;
}
