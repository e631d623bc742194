//! Extension hooks invoked at fixed points of a sync pass
//!
//! Five extension points, each a no-op by default. Commands are declared
//! as `[[hooks]]` entries in the configuration files and executed as
//! subprocesses; the resolved set is assembled once at startup.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The points at which the orchestrator invokes extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookPoint {
    /// Before any work, including lock acquisition
    Preflight,
    /// Cleanup commands composed into the lock release
    ExitTrap,
    /// After lock acquisition, before the repository is synchronized
    Prerun,
    /// After repository sync, before change-set computation
    PostRepoUp,
    /// After the full pass completes
    Postrun,
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preflight => write!(f, "preflight"),
            Self::ExitTrap => write!(f, "exit-trap"),
            Self::Prerun => write!(f, "prerun"),
            Self::PostRepoUp => write!(f, "post-repo-up"),
            Self::Postrun => write!(f, "postrun"),
        }
    }
}

impl HookPoint {
    /// Parse a hook point from its configuration name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preflight" => Some(Self::Preflight),
            "exit-trap" => Some(Self::ExitTrap),
            "prerun" => Some(Self::Prerun),
            "post-repo-up" => Some(Self::PostRepoUp),
            "postrun" => Some(Self::Postrun),
            _ => None,
        }
    }

    /// List all valid point names
    pub fn all_names() -> &'static [&'static str] {
        &["preflight", "exit-trap", "prerun", "post-repo-up", "postrun"]
    }
}

/// A single configured hook command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookCommand {
    /// The point at which this command runs
    pub point: HookPoint,
    /// The command to execute
    pub command: String,
    /// Arguments to pass to the command
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory override (defaults to the repository working copy)
    pub working_dir: Option<PathBuf>,
}

impl HookCommand {
    /// Execute the command as a subprocess with captured output
    pub(crate) fn run(&self, default_dir: &Path) -> Result<()> {
        let work_dir = self.working_dir.as_deref().unwrap_or(default_dir);
        tracing::debug!(point = %self.point, command = %self.command, "running hook");

        let output = Command::new(&self.command)
            .args(&self.args)
            .current_dir(work_dir)
            .output()
            .map_err(|source| Error::HookFailed {
                point: self.point.to_string(),
                command: self.command.clone(),
                message: source.to_string(),
            })?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                tracing::debug!(point = %self.point, output = %stdout.trim(), "hook output");
            }
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exit code {:?}", output.status.code())
        } else {
            format!("exit code {:?}: {}", output.status.code(), stderr)
        };
        Err(Error::HookFailed {
            point: self.point.to_string(),
            command: self.command.clone(),
            message,
        })
    }
}

/// The resolved hooks for one run. Every point defaults to "do nothing".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookSet {
    preflight: Vec<HookCommand>,
    prerun: Vec<HookCommand>,
    post_repo_up: Vec<HookCommand>,
    postrun: Vec<HookCommand>,
    exit_trap: Vec<HookCommand>,
}

impl HookSet {
    /// Partition a configuration file's `[[hooks]]` entries by point
    pub fn from_commands(commands: Vec<HookCommand>) -> Self {
        let mut set = Self::default();
        for command in commands {
            match command.point {
                HookPoint::Preflight => set.preflight.push(command),
                HookPoint::Prerun => set.prerun.push(command),
                HookPoint::PostRepoUp => set.post_repo_up.push(command),
                HookPoint::Postrun => set.postrun.push(command),
                HookPoint::ExitTrap => set.exit_trap.push(command),
            }
        }
        set
    }

    /// Layer a later configuration source over this one.
    ///
    /// A later definition for a run point replaces the earlier one;
    /// exit-trap commands compose in source order instead, so every
    /// source's cleanup still runs.
    pub fn merge(&mut self, later: HookSet) {
        if !later.preflight.is_empty() {
            self.preflight = later.preflight;
        }
        if !later.prerun.is_empty() {
            self.prerun = later.prerun;
        }
        if !later.post_repo_up.is_empty() {
            self.post_repo_up = later.post_repo_up;
        }
        if !later.postrun.is_empty() {
            self.postrun = later.postrun;
        }
        self.exit_trap.extend(later.exit_trap);
    }

    /// Run every command configured for a run point, in order, fail-fast
    pub fn run(&self, point: HookPoint, default_dir: &Path) -> Result<()> {
        for command in self.commands_for(point) {
            command.run(default_dir)?;
        }
        Ok(())
    }

    /// Cleanup commands to compose into the lock release
    pub fn exit_trap(&self) -> &[HookCommand] {
        &self.exit_trap
    }

    pub fn is_empty(&self) -> bool {
        self.preflight.is_empty()
            && self.prerun.is_empty()
            && self.post_repo_up.is_empty()
            && self.postrun.is_empty()
            && self.exit_trap.is_empty()
    }

    fn commands_for(&self, point: HookPoint) -> &[HookCommand] {
        match point {
            HookPoint::Preflight => &self.preflight,
            HookPoint::Prerun => &self.prerun,
            HookPoint::PostRepoUp => &self.post_repo_up,
            HookPoint::Postrun => &self.postrun,
            HookPoint::ExitTrap => &self.exit_trap,
        }
    }
}
