//! Subprocess-backed Subversion client
//!
//! Wraps the `svn` binary, capturing output and translating the
//! `diff --summarize` text format into structured entries exactly once.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::client::{ChangeKind, DiffEntry, Revision, VcsClient};
use crate::error::{Error, Result};

/// Subversion client bound to one repository URL and working copy.
#[derive(Debug, Clone)]
pub struct SvnClient {
    url: String,
    working_copy: PathBuf,
    binary: PathBuf,
}

impl SvnClient {
    pub fn new(url: impl Into<String>, working_copy: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            working_copy: working_copy.into(),
            binary: PathBuf::from("svn"),
        }
    }

    /// Use a specific `svn` binary instead of resolving from `PATH`
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn working_copy(&self) -> &Path {
        &self.working_copy
    }

    /// Run `svn` with the given arguments, returning captured stdout
    fn run(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        tracing::debug!(%command, "running svn");

        let output = Command::new(&self.binary)
            .current_dir(cwd)
            .args(args)
            .output()
            .map_err(|source| Error::Spawn {
                command: command.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::error!(%command, %stderr, "svn command failed");
            Err(Error::CommandFailed {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr,
            })
        }
    }
}

impl VcsClient for SvnClient {
    fn is_working_copy(&self) -> bool {
        self.working_copy.join(".svn").is_dir()
    }

    fn checkout(&self) -> Result<()> {
        let target = self.working_copy.to_string_lossy().to_string();
        let cwd = match self.working_copy.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                let _ = fs::create_dir_all(parent);
                parent.to_path_buf()
            }
            _ => PathBuf::from("."),
        };
        self.run(
            &cwd,
            &["checkout", "--non-interactive", &self.url, &target],
        )?;
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        self.run(&self.working_copy, &["cleanup"])?;
        self.run(&self.working_copy, &["revert", "--recursive", "."])?;
        Ok(())
    }

    fn update(&self) -> Result<()> {
        self.run(&self.working_copy, &["update", "--non-interactive"])?;
        Ok(())
    }

    fn current_revision(&self) -> Result<Revision> {
        let output = self.run(
            &self.working_copy,
            &["info", "--show-item", "revision", "--no-newline"],
        )?;
        let trimmed = output.trim();
        trimmed.parse().map_err(|_| Error::InvalidRevision {
            output: trimmed.to_string(),
        })
    }

    fn diff_summary(&self, old: Revision, new: Revision, subtree: &str) -> Result<Vec<DiffEntry>> {
        let range = format!("-r{old}:{new}");
        let output = self.run(
            &self.working_copy,
            &["diff", "--summarize", &range, subtree],
        )?;
        Ok(parse_diff_summary(&output, subtree))
    }
}

/// Parse `svn diff --summarize` output into structured entries.
///
/// The first column is the item status; a leading space means the line is a
/// property-only change and is skipped. Paths are returned relative to
/// `subtree`; the subtree root entry itself is dropped.
pub(crate) fn parse_diff_summary(output: &str, subtree: &str) -> Vec<DiffEntry> {
    let mut entries = Vec::new();

    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let kind = match line.as_bytes()[0] {
            b'A' => ChangeKind::Added,
            b'M' => ChangeKind::Modified,
            b'D' => ChangeKind::Deleted,
            b'R' => ChangeKind::Replaced,
            _ => continue,
        };

        let raw = line[1..].trim_start().replace('\\', "/");
        if raw == subtree {
            continue;
        }
        let path = raw
            .strip_prefix(subtree)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(&raw);
        if path.is_empty() {
            continue;
        }

        entries.push(DiffEntry::new(kind, path));
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_diff_summary_basic() {
        let output = "\
A       cookbooks/foo/recipes/default.rb
M       cookbooks/foo/metadata.rb
D       cookbooks/bar
";
        let entries = parse_diff_summary(output, "cookbooks");
        assert_eq!(
            entries,
            vec![
                DiffEntry::new(ChangeKind::Added, "foo/recipes/default.rb"),
                DiffEntry::new(ChangeKind::Modified, "foo/metadata.rb"),
                DiffEntry::new(ChangeKind::Deleted, "bar"),
            ]
        );
    }

    #[test]
    fn test_parse_diff_summary_skips_property_only_lines() {
        let output = " M      cookbooks/foo\nM       cookbooks/foo/attributes/default.rb\n";
        let entries = parse_diff_summary(output, "cookbooks");
        assert_eq!(
            entries,
            vec![DiffEntry::new(
                ChangeKind::Modified,
                "foo/attributes/default.rb"
            )]
        );
    }

    #[test]
    fn test_parse_diff_summary_skips_subtree_root() {
        let output = "M       roles\nA       roles/web.json\n";
        let entries = parse_diff_summary(output, "roles");
        assert_eq!(
            entries,
            vec![DiffEntry::new(ChangeKind::Added, "web.json")]
        );
    }

    #[test]
    fn test_parse_diff_summary_replaced() {
        let entries = parse_diff_summary("R       roles/db.rb\n", "roles");
        assert_eq!(entries, vec![DiffEntry::new(ChangeKind::Replaced, "db.rb")]);
    }

    #[test]
    fn test_parse_diff_summary_windows_separators() {
        let entries = parse_diff_summary("D       cookbooks\\bar\\recipes\\default.rb\n", "cookbooks");
        assert_eq!(
            entries,
            vec![DiffEntry::new(ChangeKind::Deleted, "bar/recipes/default.rb")]
        );
    }

    #[test]
    fn test_parse_diff_summary_empty_output() {
        assert!(parse_diff_summary("", "cookbooks").is_empty());
        assert!(parse_diff_summary("\n\n", "cookbooks").is_empty());
    }

    #[test]
    fn test_is_working_copy_detects_svn_dir() {
        let temp = TempDir::new().unwrap();
        let client = SvnClient::new("https://svn.example.org/repo", temp.path());
        assert!(!client.is_working_copy());

        std::fs::create_dir(temp.path().join(".svn")).unwrap();
        assert!(client.is_working_copy());
    }

    #[test]
    fn test_missing_binary_reports_spawn_error() {
        let temp = TempDir::new().unwrap();
        let client = SvnClient::new("https://svn.example.org/repo", temp.path().join("wc"))
            .with_binary(temp.path().join("no-such-svn"));

        let err = client.checkout().unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
