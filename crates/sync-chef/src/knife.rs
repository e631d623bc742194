//! Subprocess-backed knife client
//!
//! Invokes `knife` from the repository working copy so cookbook and role
//! paths resolve against the checked-out tree.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::client::ServerClient;
use crate::error::{Error, Result};

/// Knife client bound to one repository working copy.
#[derive(Debug, Clone)]
pub struct KnifeClient {
    repo_root: PathBuf,
    config: Option<PathBuf>,
    binary: PathBuf,
}

impl KnifeClient {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            config: None,
            binary: PathBuf::from("knife"),
        }
    }

    /// Pass an explicit knife configuration file (`--config`)
    pub fn with_config(mut self, config: impl Into<PathBuf>) -> Self {
        self.config = Some(config.into());
        self
    }

    /// Use a specific `knife` binary instead of resolving from `PATH`
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Run `knife` with the given arguments, returning captured stdout
    fn run(&self, args: &[&str]) -> Result<String> {
        let mut full_args: Vec<&str> = args.to_vec();
        let config_str;
        if let Some(config) = &self.config {
            config_str = config.to_string_lossy().to_string();
            full_args.push("--config");
            full_args.push(&config_str);
        }

        let command = format!("{} {}", self.binary.display(), full_args.join(" "));
        tracing::debug!(%command, "running knife");

        let output = Command::new(&self.binary)
            .current_dir(&self.repo_root)
            .args(&full_args)
            .output()
            .map_err(|source| Error::Spawn {
                command: command.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::error!(%command, %stderr, "knife command failed");
            Err(Error::CommandFailed {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr,
            })
        }
    }
}

impl ServerClient for KnifeClient {
    fn upload_all_cookbooks(&self) -> Result<()> {
        self.run(&["cookbook", "upload", "--all"])?;
        Ok(())
    }

    fn upload_cookbooks(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let mut args = vec!["cookbook", "upload"];
        args.extend(names.iter().map(String::as_str));
        self.run(&args)?;
        Ok(())
    }

    fn delete_cookbook(&self, name: &str) -> Result<()> {
        self.run(&["cookbook", "delete", name, "--yes"])?;
        Ok(())
    }

    fn upload_roles(&self, files: &[PathBuf]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let rendered: Vec<String> = files
            .iter()
            .map(|f| f.to_string_lossy().to_string())
            .collect();
        let mut args = vec!["role", "from", "file"];
        args.extend(rendered.iter().map(String::as_str));
        self.run(&args)?;
        Ok(())
    }

    fn delete_role(&self, name: &str) -> Result<()> {
        self.run(&["role", "delete", name, "--yes"])?;
        Ok(())
    }
}
