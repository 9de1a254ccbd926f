//! State directory behavior driven by the `LIBSTACK_HOME` environment variable.
//!
//! These tests mutate process-global env and run serially.

use std::collections::BTreeMap;

use libstack::config::{RunContext, Secret, TestDataChoice};
use libstack::engine::{Sequencer, StepOutcome, ThreadSleeper, parse_plan};
use libstack::lock::{LockError, RunLock};
use libstack::paths;
use libstack::runner::NativeRunner;
use libstack::RunSummary;
use serial_test::serial;
use tempfile::TempDir;

struct EnvHome {
    _dir: TempDir,
    path: camino::Utf8PathBuf,
}

impl EnvHome {
    fn set() -> Self {
        let dir = TempDir::new().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("state")).unwrap();
        // SAFETY: every test touching LIBSTACK_HOME is #[serial].
        unsafe { std::env::set_var("LIBSTACK_HOME", path.as_str()) };
        Self { _dir: dir, path }
    }
}

impl Drop for EnvHome {
    fn drop(&mut self) {
        // SAFETY: see EnvHome::set.
        unsafe { std::env::remove_var("LIBSTACK_HOME") };
    }
}

fn context(install_dir: &str) -> RunContext {
    RunContext {
        admin_email: "repo-admin@library.example".to_string(),
        admin_password: Secret::new("state-dir-test-passphrase"),
        admin_first_name: "Ada".to_string(),
        admin_last_name: "Lovelace".to_string(),
        server_url: "http://localhost:8080/server".to_string(),
        ui_url: "http://localhost:4000".to_string(),
        site_name: "Library Repository".to_string(),
        install_dir: install_dir.to_string(),
        test_data: TestDataChoice::None,
        vars: BTreeMap::new(),
    }
}

#[test]
#[serial]
fn test_state_paths_follow_the_environment() {
    let home = EnvHome::set();
    assert_eq!(paths::libstack_home(), home.path);
    assert_eq!(paths::locks_dir(), home.path.join("locks"));
    assert_eq!(
        paths::last_run_path("koha-docker"),
        home.path.join("runs/koha-docker/last-run.json")
    );
}

#[cfg(unix)]
#[test]
#[serial]
fn test_persisted_summary_is_returned_by_load_last() {
    let home = EnvHome::set();
    let install = TempDir::new().unwrap();
    let install_dir = install.path().to_str().unwrap().to_string();

    let plan = parse_plan(
        r#"
name = "persisted"

[[steps]]
name = "touch"
run = [["touch", "${install_dir}/done"]]
[steps.guard]
path = "${install_dir}/done"
"#,
        "persisted.toml",
    )
    .unwrap();
    let ctx = context(&install_dir);
    let rendered = plan.render(&ctx).unwrap();

    assert!(RunSummary::load_last("persisted").unwrap().is_none());

    let runner = NativeRunner::new();
    let summary = Sequencer::new(&rendered, &ctx, &runner, &ThreadSleeper)
        .run()
        .unwrap();
    assert_eq!(summary.outcome_of("touch"), Some(StepOutcome::Ran));

    let path = summary.persist().unwrap();
    assert!(path.starts_with(&home.path));

    let loaded = RunSummary::load_last("persisted").unwrap().unwrap();
    assert_eq!(loaded, summary);
    assert!(loaded.succeeded());
}

#[test]
#[serial]
fn test_run_lock_is_exclusive_per_plan() {
    let _home = EnvHome::set();
    let locks = paths::locks_dir();

    let first = RunLock::acquire(&locks, "dspace-docker", false, None).unwrap();
    let second = RunLock::acquire(&locks, "dspace-docker", false, None);
    assert!(matches!(second, Err(LockError::Held { .. })));

    let other = RunLock::acquire(&locks, "koha-docker", false, None).unwrap();
    drop(other);

    let lock_file = first.path().to_owned();
    first.release().unwrap();
    assert!(!lock_file.exists());

    RunLock::acquire(&locks, "dspace-docker", false, None).unwrap();
}
