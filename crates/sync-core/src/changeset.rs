//! Change-set computation between two synchronized revisions
//!
//! Converts a revision range into the precise set of cookbook and role
//! additions and deletions, either by bootstrapping from the working copy
//! (first run) or by classifying the structured diff summary.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use sync_vcs::{ChangeKind, DiffEntry, Revision, VcsClient};

use crate::error::{Error, Result};

/// Role files are recognized by these extensions, both when listing the
/// roles directory at bootstrap and when filtering diff entries.
pub const ROLE_EXTENSIONS: [&str; 3] = ["json", "rb", "yml"];

/// Cookbooks to upload for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookbookAdditions {
    /// Upload every cookbook currently present (bootstrap sentinel)
    All,
    /// Upload exactly the named cookbooks
    Named(BTreeSet<String>),
}

impl CookbookAdditions {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::All => false,
            Self::Named(names) => names.is_empty(),
        }
    }
}

/// The computed additions and deletions for one revision range.
///
/// Sets are deduplicated and iterate in sorted order, so logs produced
/// from the same diff input are reproducible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub added_cookbooks: CookbookAdditions,
    pub deleted_cookbooks: BTreeSet<String>,
    /// Full role filenames to create or update (e.g. `web.json`)
    pub added_roles: BTreeSet<String>,
    /// Role base names to delete (extension stripped)
    pub deleted_roles: BTreeSet<String>,
}

impl ChangeSet {
    pub fn empty() -> Self {
        Self {
            added_cookbooks: CookbookAdditions::Named(BTreeSet::new()),
            deleted_cookbooks: BTreeSet::new(),
            added_roles: BTreeSet::new(),
            deleted_roles: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_cookbooks.is_empty()
            && self.deleted_cookbooks.is_empty()
            && self.added_roles.is_empty()
            && self.deleted_roles.is_empty()
    }
}

/// Whether a flat filename carries one of the recognized role extensions
pub fn is_role_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ROLE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Computes the change set for a revision range against one working copy.
pub struct DiffEngine<'a> {
    vcs: &'a dyn VcsClient,
    working_copy: &'a Path,
    cookbooks_dir: &'a str,
    roles_dir: &'a str,
}

impl<'a> DiffEngine<'a> {
    pub fn new(
        vcs: &'a dyn VcsClient,
        working_copy: &'a Path,
        cookbooks_dir: &'a str,
        roles_dir: &'a str,
    ) -> Self {
        Self {
            vcs,
            working_copy,
            cookbooks_dir,
            roles_dir,
        }
    }

    /// Compute the change set for `old..new`.
    ///
    /// `old == 0` means "never synchronized" and bootstraps from the
    /// working copy instead of querying a diff; nothing is ever deleted
    /// relative to nonexistent prior state.
    pub fn compute(&self, old: Revision, new: Revision) -> Result<ChangeSet> {
        if old == 0 {
            self.bootstrap()
        } else {
            self.incremental(old, new)
        }
    }

    fn bootstrap(&self) -> Result<ChangeSet> {
        let roles_root = self.working_copy.join(self.roles_dir);
        let mut added_roles = BTreeSet::new();

        if roles_root.is_dir() {
            let entries = fs::read_dir(&roles_root).map_err(|source| Error::Io {
                path: roles_root.clone(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| Error::Io {
                    path: roles_root.clone(),
                    source,
                })?;
                if !entry.path().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if is_role_file(&name) {
                    added_roles.insert(name);
                }
            }
        }

        Ok(ChangeSet {
            added_cookbooks: CookbookAdditions::All,
            deleted_cookbooks: BTreeSet::new(),
            added_roles,
            deleted_roles: BTreeSet::new(),
        })
    }

    fn incremental(&self, old: Revision, new: Revision) -> Result<ChangeSet> {
        let cookbook_entries = self
            .vcs
            .diff_summary(old, new, self.cookbooks_dir)
            .map_err(|source| Error::RevisionQuery { source })?;
        let role_entries = self
            .vcs
            .diff_summary(old, new, self.roles_dir)
            .map_err(|source| Error::RevisionQuery { source })?;

        Ok(classify(&cookbook_entries, &role_entries))
    }
}

/// Classify scoped diff entries into a change set.
///
/// Cookbook rules: any add/modify under a cookbook marks it for upload. A
/// deletion with a path separator means a file inside the cookbook went
/// away while the cookbook survives, so it is re-uploaded; a bare deletion
/// is the cookbook's own top-level entry and marks it deleted. A cookbook
/// both added and deleted within the range counts as added only.
///
/// Role rules: roles are flat files, so entries with a path separator or an
/// unrecognized extension are ignored; additions keep the full filename,
/// deletions keep the base name.
pub(crate) fn classify(cookbooks: &[DiffEntry], roles: &[DiffEntry]) -> ChangeSet {
    let mut added = BTreeSet::new();
    let mut deleted = BTreeSet::new();

    for entry in cookbooks {
        let name = match entry.path.split('/').next() {
            Some(first) if !first.is_empty() => first.to_string(),
            _ => continue,
        };
        match entry.kind {
            ChangeKind::Added | ChangeKind::Modified | ChangeKind::Replaced => {
                added.insert(name);
            }
            ChangeKind::Deleted => {
                if entry.path.contains('/') {
                    added.insert(name);
                } else {
                    deleted.insert(name);
                }
            }
        }
    }
    // add wins over delete for the same cookbook name
    deleted.retain(|name| !added.contains(name));

    let mut added_roles = BTreeSet::new();
    let mut deleted_roles = BTreeSet::new();

    for entry in roles {
        if entry.path.contains('/') || !is_role_file(&entry.path) {
            continue;
        }
        match entry.kind {
            ChangeKind::Added | ChangeKind::Modified | ChangeKind::Replaced => {
                added_roles.insert(entry.path.clone());
            }
            ChangeKind::Deleted => {
                if let Some(stem) = Path::new(&entry.path).file_stem().and_then(|s| s.to_str()) {
                    deleted_roles.insert(stem.to_string());
                }
            }
        }
    }

    ChangeSet {
        added_cookbooks: CookbookAdditions::Named(added),
        deleted_cookbooks: deleted,
        added_roles,
        deleted_roles,
    }
}
