//! State directory layout
//!
//! ```text
//! <LIBSTACK_HOME>/
//!   config.toml          (optional, discovered by libstack-config)
//!   locks/<plan>.lock    (held while a plan is being provisioned)
//!   runs/<plan>/last-run.json
//! ```

use camino::Utf8PathBuf;
use std::cell::RefCell;

// Thread-local override used only in tests to avoid process-global env races.
thread_local! {
    static THREAD_HOME: RefCell<Option<Utf8PathBuf>> = const { RefCell::new(None) };
}

/// Resolve libstack home:
/// 1) thread-local override (tests use this)
/// 2) env `LIBSTACK_HOME`
/// 3) default ".libstack"
#[must_use]
pub fn libstack_home() -> Utf8PathBuf {
    if let Some(tl) = THREAD_HOME.with(|tl| tl.borrow().clone()) {
        return tl;
    }
    if let Ok(p) = std::env::var("LIBSTACK_HOME") {
        return Utf8PathBuf::from(p);
    }
    Utf8PathBuf::from(".libstack")
}

/// Returns `<LIBSTACK_HOME>/locks`
#[must_use]
pub fn locks_dir() -> Utf8PathBuf {
    libstack_home().join("locks")
}

/// Returns `<LIBSTACK_HOME>/runs/<plan>`
#[must_use]
pub fn run_dir(plan: &str) -> Utf8PathBuf {
    libstack_home().join("runs").join(plan)
}

/// Returns `<LIBSTACK_HOME>/runs/<plan>/last-run.json`
#[must_use]
pub fn last_run_path(plan: &str) -> Utf8PathBuf {
    run_dir(plan).join("last-run.json")
}

/// mkdir -p; treat `AlreadyExists` as success
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// RAII guard for isolated home that clears thread-local state on drop
#[cfg(any(test, feature = "test-utils"))]
pub struct HomeGuard {
    inner: tempfile::TempDir,
}

#[cfg(any(test, feature = "test-utils"))]
impl HomeGuard {
    /// The isolated home as a UTF-8 path.
    #[must_use]
    pub fn utf8_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.inner.path().to_path_buf())
            .unwrap_or_else(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()))
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Drop for HomeGuard {
    fn drop(&mut self) {
        THREAD_HOME.with(|tl| *tl.borrow_mut() = None);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl std::ops::Deref for HomeGuard {
    type Target = tempfile::TempDir;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Give this test thread a unique home under the system temp dir.
///
/// Hold the `HomeGuard` for the test's duration so the directory stays alive.
#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn with_isolated_home() -> HomeGuard {
    let td = tempfile::TempDir::new().expect("create temp home");
    let p = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).expect("utf-8 temp dir");
    THREAD_HOME.with(|tl| *tl.borrow_mut() = Some(p));
    HomeGuard { inner: td }
}
