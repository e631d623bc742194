//! Single-instance execution guard with staleness recovery
//!
//! A filesystem marker provides cross-process mutual exclusion; its
//! modification time doubles as the staleness clock. The owner's identity
//! is persisted alongside so a later run can terminate an abandoned
//! instance before reclaiming the lock.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hooks::HookCommand;

/// Identity of the instance holding the lock, persisted so a future
/// stale-lock recovery can find and terminate its process tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pub pid: u32,
    /// Unix timestamp of acquisition
    pub started_at: u64,
}

impl ProcessIdentity {
    pub fn current() -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            pid: std::process::id(),
            started_at,
        }
    }
}

/// Outcome of an acquisition attempt.
#[derive(Debug)]
pub enum Acquisition {
    /// This instance now holds the lock
    Acquired(LockGuard),
    /// A live instance already holds the lock. The caller must exit
    /// without doing any work; there is nothing to release.
    Busy { age: Duration },
}

/// Holds the lock marker for the duration of a run.
///
/// Release runs on every exit path: explicitly, on drop (errors and
/// panics), or through a [`CleanupHandle`] from a termination-signal
/// handler. Composed cleanup commands run first, then the identity record
/// and the marker are removed.
#[derive(Debug)]
pub struct LockGuard {
    lock_path: PathBuf,
    pid_path: PathBuf,
    cleanup: Vec<HookCommand>,
    cleanup_dir: PathBuf,
    held: Arc<AtomicBool>,
}

impl LockGuard {
    /// Attempt to atomically create the lock marker.
    ///
    /// An existing marker older than `max_age` is treated as abandoned:
    /// the recorded owner's process tree is terminated (best-effort), the
    /// marker is force-cleared, and creation is retried exactly once. A
    /// younger marker reports `Busy` immediately.
    pub fn acquire(
        lock_path: impl Into<PathBuf>,
        pid_path: impl Into<PathBuf>,
        max_age: Duration,
    ) -> Result<Acquisition> {
        let lock_path = lock_path.into();
        let pid_path = pid_path.into();

        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        if !try_create(&lock_path)? {
            let age = match marker_age(&lock_path) {
                Some(age) => age,
                // marker vanished between the failed create and the stat;
                // the owner is live and just finished
                None => return Ok(Acquisition::Busy { age: Duration::ZERO }),
            };

            if age <= max_age {
                return Ok(Acquisition::Busy { age });
            }

            tracing::warn!(
                path = %lock_path.display(),
                age_secs = age.as_secs(),
                "clearing stale lock"
            );
            terminate_owner(&pid_path);
            let _ = fs::remove_file(&pid_path);
            let _ = fs::remove_file(&lock_path);

            if !try_create(&lock_path)? {
                // lost the re-acquisition race to another instance
                return Ok(Acquisition::Busy { age: Duration::ZERO });
            }
        }

        let identity = ProcessIdentity::current();
        let record = serde_json::to_string(&identity).unwrap_or_default();
        fs::write(&pid_path, record).map_err(|source| Error::Io {
            path: pid_path.clone(),
            source,
        })?;

        tracing::debug!(pid = identity.pid, path = %lock_path.display(), "lock acquired");

        let cleanup_dir = lock_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Acquisition::Acquired(LockGuard {
            lock_path,
            pid_path,
            cleanup: Vec::new(),
            cleanup_dir,
            held: Arc::new(AtomicBool::new(true)),
        }))
    }

    /// Compose additional cleanup commands into the release, run before
    /// the marker is removed. `default_dir` is their working directory.
    pub fn add_cleanup(&mut self, commands: Vec<HookCommand>, default_dir: impl Into<PathBuf>) {
        self.cleanup.extend(commands);
        self.cleanup_dir = default_dir.into();
    }

    /// Snapshot of the composed cleanup for a termination-signal handler.
    ///
    /// Taking the snapshot after [`add_cleanup`](Self::add_cleanup) makes
    /// the handler run the same cleanup as a normal release; the shared
    /// held flag guarantees it runs at most once across both paths.
    pub fn cleanup_handle(&self) -> CleanupHandle {
        CleanupHandle {
            lock_path: self.lock_path.clone(),
            pid_path: self.pid_path.clone(),
            commands: self.cleanup.clone(),
            default_dir: self.cleanup_dir.clone(),
            held: Arc::clone(&self.held),
        }
    }

    /// Remove the lock marker and identity record. Idempotent.
    pub fn release(&mut self) {
        if !self.held.swap(false, Ordering::SeqCst) {
            return;
        }
        run_cleanup(
            &self.cleanup,
            &self.cleanup_dir,
            &self.pid_path,
            &self.lock_path,
        );
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// `Clone + Send` view of a guard's cleanup, for interruption handlers.
#[derive(Debug, Clone)]
pub struct CleanupHandle {
    lock_path: PathBuf,
    pid_path: PathBuf,
    commands: Vec<HookCommand>,
    default_dir: PathBuf,
    held: Arc<AtomicBool>,
}

impl CleanupHandle {
    /// Run the composed cleanup if the lock is still held.
    pub fn run(&self) {
        if !self.held.swap(false, Ordering::SeqCst) {
            return;
        }
        run_cleanup(
            &self.commands,
            &self.default_dir,
            &self.pid_path,
            &self.lock_path,
        );
    }
}

fn run_cleanup(commands: &[HookCommand], default_dir: &Path, pid_path: &Path, lock_path: &Path) {
    for command in commands {
        if let Err(err) = command.run(default_dir) {
            tracing::warn!(%err, "exit-trap command failed during lock release");
        }
    }
    let _ = fs::remove_file(pid_path);
    match fs::remove_file(lock_path) {
        Ok(()) => tracing::debug!(path = %lock_path.display(), "lock released"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(%err, path = %lock_path.display(), "could not remove lock marker"),
    }
}

/// Atomically create the marker; `Ok(false)` means it already exists.
fn try_create(path: &Path) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let _ = writeln!(file, "{}", std::process::id());
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(source) => Err(Error::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Wall-clock age of the marker, `None` if it no longer exists.
fn marker_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}

/// Read the abandoned owner's identity and terminate its process tree.
fn terminate_owner(pid_path: &Path) {
    let identity: Option<ProcessIdentity> = fs::read_to_string(pid_path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok());

    let Some(identity) = identity else {
        tracing::warn!(path = %pid_path.display(), "stale lock has no readable owner record");
        return;
    };
    if identity.pid == std::process::id() {
        return;
    }

    tracing::warn!(pid = identity.pid, "terminating abandoned instance");
    kill_tree(identity.pid);
}

/// Forcefully terminate a process and its direct children (best-effort)
fn kill_tree(pid: u32) {
    #[cfg(unix)]
    {
        let _ = Command::new("pkill")
            .args(["-9", "-P", &pid.to_string()])
            .output();
        let _ = Command::new("kill").args(["-9", &pid.to_string()]).output();
    }
    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .output();
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookPoint;
    use tempfile::TempDir;

    fn paths(temp: &TempDir) -> (PathBuf, PathBuf) {
        (temp.path().join("sync.lock"), temp.path().join("sync.pid"))
    }

    const MAX_AGE: Duration = Duration::from_secs(3600);

    #[test]
    fn test_fresh_acquire_creates_marker_and_identity() {
        let temp = TempDir::new().unwrap();
        let (lock_path, pid_path) = paths(&temp);

        let acquisition = LockGuard::acquire(&lock_path, &pid_path, MAX_AGE).unwrap();
        let Acquisition::Acquired(_guard) = acquisition else {
            panic!("fresh lock must be acquired");
        };

        assert!(lock_path.exists());
        let identity: ProcessIdentity =
            serde_json::from_str(&fs::read_to_string(&pid_path).unwrap()).unwrap();
        assert_eq!(identity.pid, std::process::id());
    }

    #[test]
    fn test_second_acquire_is_busy_and_leaves_the_marker() {
        let temp = TempDir::new().unwrap();
        let (lock_path, pid_path) = paths(&temp);

        let first = LockGuard::acquire(&lock_path, &pid_path, MAX_AGE).unwrap();
        assert!(matches!(first, Acquisition::Acquired(_)));

        let second = LockGuard::acquire(&lock_path, &pid_path, MAX_AGE).unwrap();
        let Acquisition::Busy { .. } = second else {
            panic!("held lock must report busy");
        };
        // the busy path never releases what it did not acquire
        drop(second);
        assert!(lock_path.exists());
    }

    #[test]
    fn test_release_removes_marker_and_identity() {
        let temp = TempDir::new().unwrap();
        let (lock_path, pid_path) = paths(&temp);

        let Acquisition::Acquired(mut guard) =
            LockGuard::acquire(&lock_path, &pid_path, MAX_AGE).unwrap()
        else {
            panic!("fresh lock must be acquired");
        };
        guard.release();

        assert!(!lock_path.exists());
        assert!(!pid_path.exists());

        // idempotent
        guard.release();
    }

    #[test]
    fn test_drop_releases() {
        let temp = TempDir::new().unwrap();
        let (lock_path, pid_path) = paths(&temp);

        {
            let acquisition = LockGuard::acquire(&lock_path, &pid_path, MAX_AGE).unwrap();
            assert!(matches!(acquisition, Acquisition::Acquired(_)));
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let temp = TempDir::new().unwrap();
        let (lock_path, pid_path) = paths(&temp);

        fs::write(&lock_path, "12345\n").unwrap();
        // identity of a process that cannot exist on the test host
        let identity = ProcessIdentity {
            pid: u32::MAX - 1,
            started_at: 0,
        };
        fs::write(&pid_path, serde_json::to_string(&identity).unwrap()).unwrap();

        // with a zero max age the marker turns stale after one second
        std::thread::sleep(Duration::from_millis(1100));
        let acquisition = LockGuard::acquire(&lock_path, &pid_path, Duration::ZERO).unwrap();
        let Acquisition::Acquired(_guard) = acquisition else {
            panic!("stale lock must be reclaimed");
        };

        let reclaimed: ProcessIdentity =
            serde_json::from_str(&fs::read_to_string(&pid_path).unwrap()).unwrap();
        assert_eq!(reclaimed.pid, std::process::id());
    }

    #[test]
    fn test_stale_lock_without_identity_record_is_reclaimed() {
        let temp = TempDir::new().unwrap();
        let (lock_path, pid_path) = paths(&temp);

        fs::write(&lock_path, "orphan\n").unwrap();
        std::thread::sleep(Duration::from_millis(1100));

        let acquisition = LockGuard::acquire(&lock_path, &pid_path, Duration::ZERO).unwrap();
        assert!(matches!(acquisition, Acquisition::Acquired(_)));
    }

    #[test]
    fn test_live_lock_is_not_reclaimed() {
        let temp = TempDir::new().unwrap();
        let (lock_path, pid_path) = paths(&temp);

        fs::write(&lock_path, "held\n").unwrap();
        let acquisition = LockGuard::acquire(&lock_path, &pid_path, MAX_AGE).unwrap();
        assert!(matches!(acquisition, Acquisition::Busy { .. }));
        assert!(lock_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_release_runs_composed_cleanup_before_removal() {
        let temp = TempDir::new().unwrap();
        let (lock_path, pid_path) = paths(&temp);
        let marker = temp.path().join("trap-ran.txt");

        let Acquisition::Acquired(mut guard) =
            LockGuard::acquire(&lock_path, &pid_path, MAX_AGE).unwrap()
        else {
            panic!("fresh lock must be acquired");
        };
        guard.add_cleanup(
            vec![HookCommand {
                point: HookPoint::ExitTrap,
                command: "sh".to_string(),
                args: vec![
                    "-c".to_string(),
                    format!("echo done > '{}'", marker.display()),
                ],
                working_dir: None,
            }],
            temp.path(),
        );
        guard.release();

        assert!(marker.exists());
        assert!(!lock_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_cleanup_handle_releases_exactly_once() {
        let temp = TempDir::new().unwrap();
        let (lock_path, pid_path) = paths(&temp);
        let marker = temp.path().join("trap-count.txt");

        let Acquisition::Acquired(mut guard) =
            LockGuard::acquire(&lock_path, &pid_path, MAX_AGE).unwrap()
        else {
            panic!("fresh lock must be acquired");
        };
        guard.add_cleanup(
            vec![HookCommand {
                point: HookPoint::ExitTrap,
                command: "sh".to_string(),
                args: vec![
                    "-c".to_string(),
                    format!("echo run >> '{}'", marker.display()),
                ],
                working_dir: None,
            }],
            temp.path(),
        );

        let handle = guard.cleanup_handle();
        handle.run();
        assert!(!lock_path.exists());

        // subsequent release and handle runs are no-ops
        guard.release();
        handle.run();
        drop(guard);

        let content = fs::read_to_string(&marker).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
