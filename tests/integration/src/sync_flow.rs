//! Cross-crate integration tests for the full sync flow.
//!
//! The real `SvnClient` and `KnifeClient` are pointed at shell-script
//! stand-ins for `svn` and `knife`, so the subprocess invocation, the
//! summarize-output parsing, the change-set engine, the lock, and the
//! checkpoint all run together exactly as in production.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sync_chef::KnifeClient;
use sync_core::{
    Acquisition, CheckpointStore, HookSet, LockGuard, SyncConfig, SyncOptions, SyncOutcome,
    SyncRunner,
};
use sync_vcs::SvnClient;
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    config: SyncConfig,
    svn_binary: PathBuf,
    knife_binary: PathBuf,
    knife_log: PathBuf,
}

fn write_script(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// A working copy at revision 105 whose 100:105 range added a file under
/// cookbook `foo`, removed cookbook `bar`, and modified role `web.json`.
fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let state = temp.path().join("state");
    let repo = temp.path().join("repo");
    let bin = temp.path().join("bin");
    for dir in [
        &state,
        &bin,
        &repo.join(".svn"),
        &repo.join("cookbooks"),
        &repo.join("roles"),
    ] {
        fs::create_dir_all(dir).unwrap();
    }
    fs::write(repo.join("roles").join("web.json"), "{}").unwrap();

    let svn_binary = bin.join("svn");
    write_script(
        &svn_binary,
        r#"#!/bin/sh
case "$1" in
  info) printf '105' ;;
  diff)
    case "$3" in
      -r105:105) : ;;
      *)
        case "$4" in
          cookbooks) printf 'A       cookbooks/foo/recipes/default.rb\nD       cookbooks/bar\n' ;;
          roles) printf 'M       roles/web.json\n' ;;
        esac ;;
    esac ;;
esac
exit 0
"#,
    );

    let knife_log = temp.path().join("knife.log");
    let knife_binary = bin.join("knife");
    write_script(
        &knife_binary,
        &format!(
            "#!/bin/sh\necho \"knife $*\" >> \"{}\"\nexit 0\n",
            knife_log.display()
        ),
    );

    let config = SyncConfig {
        repo_url: "https://svn.example.org/chef-repo".to_string(),
        working_copy: repo,
        cookbooks_dir: "cookbooks".to_string(),
        roles_dir: "roles".to_string(),
        checkpoint_file: state.join("last_revision"),
        lock_file: state.join("sync.lock"),
        pid_file: state.join("sync.pid"),
        max_lock_age: Duration::from_secs(3600),
        knife_config: None,
        svn_binary: Some(svn_binary.clone()),
        knife_binary: Some(knife_binary.clone()),
        hooks: HookSet::default(),
    };

    Fixture {
        _temp: temp,
        config,
        svn_binary,
        knife_binary,
        knife_log,
    }
}

fn clients(fx: &Fixture) -> (SvnClient, KnifeClient) {
    let svn = SvnClient::new(fx.config.repo_url.clone(), fx.config.working_copy.clone())
        .with_binary(fx.svn_binary.clone());
    let knife = KnifeClient::new(fx.config.working_copy.clone()).with_binary(fx.knife_binary.clone());
    (svn, knife)
}

#[test]
fn test_incremental_pass_through_real_collaborators() {
    let fx = fixture();
    CheckpointStore::new(&fx.config.checkpoint_file)
        .write(100)
        .unwrap();

    let (svn, knife) = clients(&fx);
    let outcome = SyncRunner::new(&fx.config, &svn, &knife)
        .run(&SyncOptions::default())
        .unwrap();

    let SyncOutcome::Completed(report) = outcome else {
        panic!("pass must complete");
    };
    assert_eq!(report.old_revision, 100);
    assert_eq!(report.new_revision, 105);

    let knife_calls = fs::read_to_string(&fx.knife_log).unwrap();
    let lines: Vec<&str> = knife_calls.lines().collect();
    assert_eq!(
        lines,
        [
            "knife cookbook upload foo",
            "knife cookbook delete bar --yes",
            "knife role from file roles/web.json",
        ]
    );

    assert_eq!(
        CheckpointStore::new(&fx.config.checkpoint_file).read().unwrap(),
        105
    );
    assert!(!fx.config.lock_file.exists());
}

#[test]
fn test_second_pass_with_no_upstream_changes_is_a_noop() {
    let fx = fixture();
    CheckpointStore::new(&fx.config.checkpoint_file)
        .write(100)
        .unwrap();

    let (svn, knife) = clients(&fx);
    let runner = SyncRunner::new(&fx.config, &svn, &knife);
    runner.run(&SyncOptions::default()).unwrap();

    let after_first = fs::read_to_string(&fx.knife_log).unwrap();

    // the 105:105 range diffs empty, so nothing new is dispatched and the
    // checkpoint rewrites the same value
    let outcome = runner.run(&SyncOptions::default()).unwrap();
    let SyncOutcome::Completed(report) = outcome else {
        panic!("pass must complete");
    };
    assert!(report.change_set.is_empty());
    assert_eq!(report.old_revision, 105);
    assert_eq!(report.new_revision, 105);

    assert_eq!(fs::read_to_string(&fx.knife_log).unwrap(), after_first);
    assert_eq!(
        CheckpointStore::new(&fx.config.checkpoint_file).read().unwrap(),
        105
    );
}

#[test]
fn test_bootstrap_pass_through_real_collaborators() {
    let fx = fixture();

    let (svn, knife) = clients(&fx);
    let outcome = SyncRunner::new(&fx.config, &svn, &knife)
        .run(&SyncOptions::default())
        .unwrap();

    let SyncOutcome::Completed(report) = outcome else {
        panic!("pass must complete");
    };
    assert_eq!(report.old_revision, 0);
    assert!(report.change_set.deleted_cookbooks.is_empty());
    assert!(report.change_set.deleted_roles.is_empty());

    let knife_calls = fs::read_to_string(&fx.knife_log).unwrap();
    let lines: Vec<&str> = knife_calls.lines().collect();
    assert_eq!(
        lines,
        [
            "knife cookbook upload --all",
            "knife role from file roles/web.json",
        ]
    );
}

#[test]
fn test_held_lock_blocks_a_concurrent_runner() {
    let fx = fixture();

    let acquisition = LockGuard::acquire(
        &fx.config.lock_file,
        &fx.config.pid_file,
        fx.config.max_lock_age,
    )
    .unwrap();
    let Acquisition::Acquired(_guard) = acquisition else {
        panic!("fresh lock must be acquired");
    };

    let (svn, knife) = clients(&fx);
    let outcome = SyncRunner::new(&fx.config, &svn, &knife)
        .run(&SyncOptions::default())
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Busy));
    // nothing was dispatched while the other holder was active
    assert!(!fx.knife_log.exists());
}

#[test]
fn test_dry_run_leaves_no_trace_on_the_server() {
    let fx = fixture();
    CheckpointStore::new(&fx.config.checkpoint_file)
        .write(100)
        .unwrap();

    let (svn, knife) = clients(&fx);
    let outcome = SyncRunner::new(&fx.config, &svn, &knife)
        .run(&SyncOptions { dry_run: true })
        .unwrap();

    let SyncOutcome::Completed(report) = outcome else {
        panic!("pass must complete");
    };
    assert!(report.dry_run);
    assert!(
        report
            .actions
            .iter()
            .any(|action| action.contains("Would delete cookbook bar"))
    );
    assert!(!fx.knife_log.exists());
    assert_eq!(
        CheckpointStore::new(&fx.config.checkpoint_file).read().unwrap(),
        100
    );
}
