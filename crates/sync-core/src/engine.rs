//! Sync pass orchestration
//!
//! Drives the linear sequence: lock, repository sync, change-set
//! computation, dispatch, checkpoint. Every transition that calls an
//! external collaborator maps to its own failure variant, and the lock is
//! released on every exit path through the guard.

use std::path::{Path, PathBuf};

use sync_chef::ServerClient;
use sync_vcs::{Revision, VcsClient};
use tracing::{debug, info};

use crate::changeset::{ChangeSet, CookbookAdditions, DiffEngine};
use crate::checkpoint::CheckpointStore;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::hooks::HookPoint;
use crate::lock::{Acquisition, CleanupHandle, LockGuard};

/// Options for a single sync pass
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Compute and log the change set without dispatching uploads,
    /// deletions, or the checkpoint write
    pub dry_run: bool,
}

/// Report from a completed sync pass
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub old_revision: Revision,
    pub new_revision: Revision,
    pub change_set: ChangeSet,
    pub dry_run: bool,
    /// Actions taken, in order, for operator-facing output
    pub actions: Vec<String>,
}

/// Outcome of a sync attempt
#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another instance holds the lock; no work was done
    Busy,
}

/// Drives one synchronization pass over the configured repository.
pub struct SyncRunner<'a> {
    config: &'a SyncConfig,
    vcs: &'a dyn VcsClient,
    server: &'a dyn ServerClient,
}

impl<'a> SyncRunner<'a> {
    pub fn new(
        config: &'a SyncConfig,
        vcs: &'a dyn VcsClient,
        server: &'a dyn ServerClient,
    ) -> Self {
        Self {
            config,
            vcs,
            server,
        }
    }

    pub fn run(&self, options: &SyncOptions) -> Result<SyncOutcome> {
        self.run_with(options, |_| {})
    }

    /// Run a pass, handing the guard's [`CleanupHandle`] to `on_acquire`
    /// so the caller can wire it into a termination-signal handler.
    pub fn run_with<F>(&self, options: &SyncOptions, on_acquire: F) -> Result<SyncOutcome>
    where
        F: FnOnce(CleanupHandle),
    {
        self.config.hooks.run(HookPoint::Preflight, &self.hook_dir())?;

        let mut guard = match LockGuard::acquire(
            &self.config.lock_file,
            &self.config.pid_file,
            self.config.max_lock_age,
        )? {
            Acquisition::Acquired(guard) => guard,
            Acquisition::Busy { age } => {
                info!(
                    age_secs = age.as_secs(),
                    "another instance is active; exiting without work"
                );
                return Ok(SyncOutcome::Busy);
            }
        };
        guard.add_cleanup(self.config.hooks.exit_trap().to_vec(), self.hook_dir());
        on_acquire(guard.cleanup_handle());

        let result = self.locked_pass(options);
        guard.release();
        result.map(SyncOutcome::Completed)
    }

    fn locked_pass(&self, options: &SyncOptions) -> Result<SyncReport> {
        let mut actions = Vec::new();

        self.config.hooks.run(HookPoint::Prerun, &self.hook_dir())?;

        if self.vcs.is_working_copy() {
            self.vcs
                .cleanup()
                .map_err(|source| Error::Cleanup { source })?;
            self.vcs.update().map_err(|source| Error::Update { source })?;
            actions.push(format!(
                "Updated working copy at {}",
                self.config.working_copy.display()
            ));
        } else {
            self.vcs
                .checkout()
                .map_err(|source| Error::Checkout { source })?;
            actions.push(format!(
                "Checked out {} to {}",
                self.config.repo_url,
                self.config.working_copy.display()
            ));
        }

        self.config.hooks.run(HookPoint::PostRepoUp, &self.hook_dir())?;

        let checkpoint = CheckpointStore::new(&self.config.checkpoint_file);
        let old = checkpoint.read()?;
        let new = self
            .vcs
            .current_revision()
            .map_err(|source| Error::RevisionQuery { source })?;
        debug!(old, new, "computing change set");

        let engine = DiffEngine::new(
            self.vcs,
            &self.config.working_copy,
            &self.config.cookbooks_dir,
            &self.config.roles_dir,
        );
        let change_set = engine.compute(old, new)?;
        self.log_change_set(&change_set);

        if options.dry_run {
            self.record_dry_run(&change_set, &mut actions);
        } else {
            self.dispatch(&change_set, &mut actions)?;
            checkpoint.write(new)?;
        }

        self.config.hooks.run(HookPoint::Postrun, &self.hook_dir())?;

        Ok(SyncReport {
            old_revision: old,
            new_revision: new,
            change_set,
            dry_run: options.dry_run,
            actions,
        })
    }

    /// Dispatch the change set. Within each artifact kind, all adds and
    /// updates complete before any delete is attempted.
    fn dispatch(&self, change_set: &ChangeSet, actions: &mut Vec<String>) -> Result<()> {
        match &change_set.added_cookbooks {
            CookbookAdditions::All => {
                self.server
                    .upload_all_cookbooks()
                    .map_err(|source| Error::CookbookUpload { source })?;
                actions.push("Uploaded all cookbooks".to_string());
            }
            CookbookAdditions::Named(names) if !names.is_empty() => {
                let names: Vec<String> = names.iter().cloned().collect();
                self.server
                    .upload_cookbooks(&names)
                    .map_err(|source| Error::CookbookUpload { source })?;
                actions.push(format!("Uploaded cookbooks: {}", names.join(", ")));
            }
            CookbookAdditions::Named(_) => {}
        }

        for name in &change_set.deleted_cookbooks {
            self.server
                .delete_cookbook(name)
                .map_err(|source| Error::CookbookDelete {
                    name: name.clone(),
                    source,
                })?;
            actions.push(format!("Deleted cookbook {name}"));
        }

        if !change_set.added_roles.is_empty() {
            let files: Vec<PathBuf> = change_set
                .added_roles
                .iter()
                .map(|file| Path::new(&self.config.roles_dir).join(file))
                .collect();
            self.server
                .upload_roles(&files)
                .map_err(|source| Error::RoleUpload { source })?;
            actions.push(format!(
                "Uploaded roles: {}",
                change_set
                    .added_roles
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        for name in &change_set.deleted_roles {
            self.server
                .delete_role(name)
                .map_err(|source| Error::RoleDelete {
                    name: name.clone(),
                    source,
                })?;
            actions.push(format!("Deleted role {name}"));
        }

        Ok(())
    }

    fn record_dry_run(&self, change_set: &ChangeSet, actions: &mut Vec<String>) {
        match &change_set.added_cookbooks {
            CookbookAdditions::All => {
                actions.push("[dry-run] Would upload all cookbooks".to_string());
            }
            CookbookAdditions::Named(names) if !names.is_empty() => {
                actions.push(format!(
                    "[dry-run] Would upload cookbooks: {}",
                    names.iter().cloned().collect::<Vec<_>>().join(", ")
                ));
            }
            CookbookAdditions::Named(_) => {}
        }
        for name in &change_set.deleted_cookbooks {
            actions.push(format!("[dry-run] Would delete cookbook {name}"));
        }
        if !change_set.added_roles.is_empty() {
            actions.push(format!(
                "[dry-run] Would upload roles: {}",
                change_set
                    .added_roles
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        for name in &change_set.deleted_roles {
            actions.push(format!("[dry-run] Would delete role {name}"));
        }
        actions.push("[dry-run] Skipped uploads, deletions, and checkpoint write".to_string());
    }

    fn log_change_set(&self, change_set: &ChangeSet) {
        match &change_set.added_cookbooks {
            CookbookAdditions::All => info!("cookbooks to upload: all"),
            CookbookAdditions::Named(names) => {
                info!(count = names.len(), names = ?names, "cookbooks to upload");
            }
        }
        info!(names = ?change_set.deleted_cookbooks, "cookbooks to delete");
        info!(names = ?change_set.added_roles, "roles to upload");
        info!(names = ?change_set.deleted_roles, "roles to delete");
    }

    /// Default working directory for hook commands: the working copy once
    /// it exists, the current directory before the first checkout.
    fn hook_dir(&self) -> PathBuf {
        if self.config.working_copy.is_dir() {
            self.config.working_copy.clone()
        } else {
            PathBuf::from(".")
        }
    }
}
