//! Startup configuration assembly
//!
//! Configuration is merged from an ordered list of candidate TOML files,
//! later sources overriding earlier ones field-wise. The result is an
//! immutable [`SyncConfig`] passed by reference into every component.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::hooks::{HookCommand, HookSet};

/// State directory used when nothing else is configured
const DEFAULT_STATE_DIR: &str = "/var/lib/cookbook-sync";

/// A lock older than this is presumed abandoned
const DEFAULT_MAX_LOCK_AGE_SECS: u64 = 3600;

/// One configuration file as written on disk. Every field is optional so
/// any source may set any subset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub repo_url: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub working_copy: Option<PathBuf>,
    pub cookbooks_dir: Option<String>,
    pub roles_dir: Option<String>,
    pub checkpoint_file: Option<PathBuf>,
    pub lock_file: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    pub max_lock_age_secs: Option<u64>,
    pub knife_config: Option<PathBuf>,
    pub svn_binary: Option<PathBuf>,
    pub knife_binary: Option<PathBuf>,
    #[serde(default)]
    pub hooks: Vec<HookCommand>,
}

impl ConfigFile {
    /// Apply a later source over this one, field-wise
    fn overlay(&mut self, later: ConfigFile) {
        if later.repo_url.is_some() {
            self.repo_url = later.repo_url;
        }
        if later.state_dir.is_some() {
            self.state_dir = later.state_dir;
        }
        if later.working_copy.is_some() {
            self.working_copy = later.working_copy;
        }
        if later.cookbooks_dir.is_some() {
            self.cookbooks_dir = later.cookbooks_dir;
        }
        if later.roles_dir.is_some() {
            self.roles_dir = later.roles_dir;
        }
        if later.checkpoint_file.is_some() {
            self.checkpoint_file = later.checkpoint_file;
        }
        if later.lock_file.is_some() {
            self.lock_file = later.lock_file;
        }
        if later.pid_file.is_some() {
            self.pid_file = later.pid_file;
        }
        if later.max_lock_age_secs.is_some() {
            self.max_lock_age_secs = later.max_lock_age_secs;
        }
        if later.knife_config.is_some() {
            self.knife_config = later.knife_config;
        }
        if later.svn_binary.is_some() {
            self.svn_binary = later.svn_binary;
        }
        if later.knife_binary.is_some() {
            self.knife_binary = later.knife_binary;
        }
    }
}

/// The effective configuration, assembled once at startup
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Repository URL to check out when no working copy exists
    pub repo_url: String,
    /// Local working copy of the repository
    pub working_copy: PathBuf,
    /// Cookbooks subtree within the repository (default `cookbooks`)
    pub cookbooks_dir: String,
    /// Roles subtree within the repository (default `roles`)
    pub roles_dir: String,
    /// Plain-text revision checkpoint
    pub checkpoint_file: PathBuf,
    /// Lock marker path
    pub lock_file: PathBuf,
    /// Owner identity record path
    pub pid_file: PathBuf,
    /// Maximum lock age before it is presumed abandoned
    pub max_lock_age: Duration,
    /// Optional knife configuration file
    pub knife_config: Option<PathBuf>,
    /// Optional explicit `svn` binary
    pub svn_binary: Option<PathBuf>,
    /// Optional explicit `knife` binary
    pub knife_binary: Option<PathBuf>,
    /// Resolved extension hooks
    pub hooks: HookSet,
}

impl SyncConfig {
    fn from_parts(file: ConfigFile, hooks: HookSet) -> Result<Self> {
        let repo_url = file
            .repo_url
            .ok_or(Error::MissingConfig { field: "repo_url" })?;
        let state_dir = file
            .state_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

        Ok(Self {
            repo_url,
            working_copy: file.working_copy.unwrap_or_else(|| state_dir.join("repo")),
            cookbooks_dir: file.cookbooks_dir.unwrap_or_else(|| "cookbooks".to_string()),
            roles_dir: file.roles_dir.unwrap_or_else(|| "roles".to_string()),
            checkpoint_file: file
                .checkpoint_file
                .unwrap_or_else(|| state_dir.join("last_revision")),
            lock_file: file.lock_file.unwrap_or_else(|| state_dir.join("sync.lock")),
            pid_file: file.pid_file.unwrap_or_else(|| state_dir.join("sync.pid")),
            max_lock_age: Duration::from_secs(
                file.max_lock_age_secs.unwrap_or(DEFAULT_MAX_LOCK_AGE_SECS),
            ),
            knife_config: file.knife_config,
            svn_binary: file.svn_binary,
            knife_binary: file.knife_binary,
            hooks,
        })
    }
}

/// Resolves configuration by merging the ordered candidate locations.
///
/// Default order: the system location, then the per-user config
/// directory. The CLI appends its `--config` path with highest precedence.
pub struct ConfigResolver {
    candidates: Vec<PathBuf>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        let mut candidates = vec![PathBuf::from("/etc/cookbook-sync/config.toml")];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("cookbook-sync").join("config.toml"));
        }
        Self { candidates }
    }

    /// Resolver with an explicit candidate list (used for testing)
    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// Append a candidate with highest precedence
    pub fn push_candidate(&mut self, path: PathBuf) {
        self.candidates.push(path);
    }

    /// Merge every present candidate into the effective configuration
    pub fn resolve(&self) -> Result<SyncConfig> {
        let mut merged = ConfigFile::default();
        let mut hooks = HookSet::default();

        for path in &self.candidates {
            let Some(file) = load_candidate(path)? else {
                continue;
            };
            tracing::debug!(path = %path.display(), "applying configuration");
            hooks.merge(HookSet::from_commands(file.hooks.clone()));
            merged.overlay(file);
        }

        SyncConfig::from_parts(merged, hooks)
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn load_candidate(path: &Path) -> Result<Option<ConfigFile>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file = toml::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(file))
}
