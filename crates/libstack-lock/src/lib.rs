//! Run lock for libstack with advisory semantics and crash recovery
//!
//! One lock file per plan under the state directory's `locks/` folder keeps two
//! `libstack provision` invocations of the same plan from interleaving their
//! steps. The locking is advisory: it coordinates libstack processes only.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::process;

/// Default age threshold after which an abandoned lock is reclaimed (in seconds)
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 3600;

const MAX_ACQUIRE_ATTEMPTS: u32 = 3;

/// Lock information stored in the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID that created the lock
    pub pid: u32,
    /// When the lock was created
    pub created_at: DateTime<Utc>,
    /// Plan being provisioned
    pub plan: String,
    /// libstack version that created the lock
    pub libstack_version: String,
}

/// Errors from run lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Plan '{plan}' is already being provisioned (PID {pid}, started {created_ago} ago)")]
    Held {
        plan: String,
        pid: u32,
        created_ago: String,
    },

    #[error(
        "Abandoned lock for plan '{plan}' (PID {pid} is gone, age {age_secs}s). Use --force-unlock to reclaim it"
    )]
    Abandoned {
        plan: String,
        pid: u32,
        age_secs: u64,
    },

    #[error("Lock file {path} is corrupted: {reason}")]
    Corrupted { path: String, reason: String },

    #[error("Failed to acquire lock: {reason}")]
    AcquisitionFailed { reason: String },

    #[error("Failed to release lock: {reason}")]
    ReleaseFailed { reason: String },

    #[error("IO error during lock operation: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive per-plan lock, released when dropped.
pub struct RunLock {
    lock_path: Utf8PathBuf,
    _fd_lock: Option<Box<RwLock<fs::File>>>,
    info: LockInfo,
}

impl RunLock {
    /// Path of the lock file for `plan` inside `locks_dir`.
    #[must_use]
    pub fn lock_path(locks_dir: &Utf8Path, plan: &str) -> Utf8PathBuf {
        let file_name: String = plan
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        locks_dir.join(format!("{file_name}.lock"))
    }

    /// Attempt to acquire the lock for `plan`.
    ///
    /// Uses `create_new` so two processes racing for the same plan cannot both
    /// win. An existing lock is overridden only when:
    /// - `force` is set, or
    /// - its owning process is gone and the lock is older than `ttl_seconds`
    ///   (default [`DEFAULT_STALE_THRESHOLD_SECS`]).
    pub fn acquire(
        locks_dir: &Utf8Path,
        plan: &str,
        force: bool,
        ttl_seconds: Option<u64>,
    ) -> Result<Self, LockError> {
        fs::create_dir_all(locks_dir).map_err(|e| LockError::AcquisitionFailed {
            reason: format!("Failed to create lock directory {locks_dir}: {e}"),
        })?;

        let lock_path = Self::lock_path(locks_dir, plan);
        let ttl = ttl_seconds.unwrap_or(DEFAULT_STALE_THRESHOLD_SECS);

        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            let info = LockInfo {
                pid: process::id(),
                created_at: Utc::now(),
                plan: plan.to_string(),
                libstack_version: env!("CARGO_PKG_VERSION").to_string(),
            };

            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&lock_path)
            {
                Ok(file) => return Self::finalize(lock_path, file, info),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Self::check_existing(&lock_path, plan, force, ttl)?;
                    Self::remove_existing(&lock_path)?;
                }
                Err(e) => {
                    return Err(LockError::AcquisitionFailed {
                        reason: format!("Failed to create lock file {lock_path}: {e}"),
                    });
                }
            }
        }

        Err(LockError::AcquisitionFailed {
            reason: format!(
                "another process re-created {lock_path} while it was being reclaimed"
            ),
        })
    }

    /// Read the lock currently held for `plan`, if any.
    pub fn inspect(locks_dir: &Utf8Path, plan: &str) -> Result<Option<LockInfo>, LockError> {
        let lock_path = Self::lock_path(locks_dir, plan);
        match fs::read_to_string(&lock_path) {
            Ok(content) => Self::parse(&lock_path, &content).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LockError::Io(e)),
        }
    }

    /// Release the lock (also done automatically on drop)
    pub fn release(mut self) -> Result<(), LockError> {
        self._fd_lock.take();
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::ReleaseFailed {
                reason: format!("Failed to remove {}: {e}", self.lock_path),
            }),
        }
    }

    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.lock_path
    }

    fn finalize(lock_path: Utf8PathBuf, file: fs::File, info: LockInfo) -> Result<Self, LockError> {
        let json =
            serde_json::to_string_pretty(&info).map_err(|e| LockError::AcquisitionFailed {
                reason: format!("Failed to serialize lock info: {e}"),
            })?;

        let mut rw_lock = Box::new(RwLock::new(file));
        {
            let mut guard = rw_lock.try_write().map_err(|_| LockError::Held {
                plan: info.plan.clone(),
                pid: 0,
                created_ago: "unknown".to_string(),
            })?;
            guard
                .write_all(json.as_bytes())
                .and_then(|()| guard.sync_all())
                .map_err(|e| LockError::AcquisitionFailed {
                    reason: format!("Failed to write {lock_path}: {e}"),
                })?;
        }

        tracing::debug!(plan = %info.plan, path = %lock_path, "acquired run lock");

        Ok(Self {
            lock_path,
            _fd_lock: Some(rw_lock),
            info,
        })
    }

    fn parse(lock_path: &Utf8Path, content: &str) -> Result<LockInfo, LockError> {
        serde_json::from_str(content).map_err(|e| LockError::Corrupted {
            path: lock_path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Decide whether an existing lock may be overridden; `Ok` means reclaim it.
    fn check_existing(
        lock_path: &Utf8Path,
        plan: &str,
        force: bool,
        ttl_seconds: u64,
    ) -> Result<(), LockError> {
        let content = match fs::read_to_string(lock_path) {
            Ok(content) => content,
            // Released between our create_new and this read.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(LockError::Io(e)),
        };

        let existing = match Self::parse(lock_path, &content) {
            Ok(existing) => existing,
            Err(_) if force => return Ok(()),
            Err(e) => return Err(e),
        };

        if force {
            tracing::warn!(plan, pid = existing.pid, "overriding run lock (--force-unlock)");
            return Ok(());
        }

        if is_process_running(existing.pid) {
            return Err(LockError::Held {
                plan: plan.to_string(),
                pid: existing.pid,
                created_ago: format_age(age_secs(&existing)),
            });
        }

        let age = age_secs(&existing);
        if age > ttl_seconds {
            tracing::warn!(plan, pid = existing.pid, age_secs = age, "reclaiming stale run lock");
            Ok(())
        } else {
            Err(LockError::Abandoned {
                plan: plan.to_string(),
                pid: existing.pid,
                age_secs: age,
            })
        }
    }

    fn remove_existing(lock_path: &Utf8Path) -> Result<(), LockError> {
        match fs::remove_file(lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::AcquisitionFailed {
                reason: format!("Failed to remove stale lock {lock_path}: {e}"),
            }),
        }
    }
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock")
            .field("lock_path", &self.lock_path)
            .field("info", &self.info)
            .field("_fd_lock", &"<RwLock>")
            .finish()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self._fd_lock.take().is_some() {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

fn age_secs(info: &LockInfo) -> u64 {
    // Clock skew can put created_at in the future.
    u64::try_from((Utc::now() - info.created_at).num_seconds()).unwrap_or(0)
}

fn format_age(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // Signal 0 only checks for existence; EPERM means it exists but belongs to someone else.
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    const DEAD_PID: u32 = 999_999_999;

    fn locks_dir() -> (TempDir, Utf8PathBuf) {
        let td = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(td.path().join("locks")).unwrap();
        (td, dir)
    }

    fn write_foreign_lock(dir: &Utf8Path, plan: &str, pid: u32, age: Duration) {
        fs::create_dir_all(dir).unwrap();
        let info = LockInfo {
            pid,
            created_at: Utc::now() - age,
            plan: plan.to_string(),
            libstack_version: "0.0.1".to_string(),
        };
        fs::write(
            RunLock::lock_path(dir, plan),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_acquire_and_release() {
        let (_td, dir) = locks_dir();
        let lock = RunLock::acquire(&dir, "dspace-docker", false, None).unwrap();
        assert!(lock.path().exists());
        assert_eq!(lock.info().pid, process::id());

        let info = RunLock::inspect(&dir, "dspace-docker").unwrap().unwrap();
        assert_eq!(info.plan, "dspace-docker");

        let path = lock.path().to_path_buf();
        lock.release().unwrap();
        assert!(!path.exists());
        assert!(RunLock::inspect(&dir, "dspace-docker").unwrap().is_none());
    }

    #[test]
    fn test_drop_removes_lock_file() {
        let (_td, dir) = locks_dir();
        let path = {
            let lock = RunLock::acquire(&dir, "koha-docker", false, None).unwrap();
            lock.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_is_rejected_while_held() {
        let (_td, dir) = locks_dir();
        let _held = RunLock::acquire(&dir, "dspace-native", false, None).unwrap();
        let err = RunLock::acquire(&dir, "dspace-native", false, None).unwrap_err();
        match err {
            LockError::Held { plan, pid, .. } => {
                assert_eq!(plan, "dspace-native");
                assert_eq!(pid, process::id());
            }
            other => panic!("expected Held, got {other:?}"),
        }
    }

    #[test]
    fn test_different_plans_do_not_conflict() {
        let (_td, dir) = locks_dir();
        let _a = RunLock::acquire(&dir, "dspace-docker", false, None).unwrap();
        let _b = RunLock::acquire(&dir, "koha-docker", false, None).unwrap();
    }

    #[test]
    fn test_recent_abandoned_lock_requires_force() {
        let (_td, dir) = locks_dir();
        write_foreign_lock(&dir, "dspace-docker", DEAD_PID, Duration::seconds(30));

        let err = RunLock::acquire(&dir, "dspace-docker", false, None).unwrap_err();
        assert!(matches!(err, LockError::Abandoned { pid: DEAD_PID, .. }));

        let lock = RunLock::acquire(&dir, "dspace-docker", true, None).unwrap();
        assert_eq!(lock.info().pid, process::id());
    }

    #[test]
    fn test_stale_abandoned_lock_is_reclaimed() {
        let (_td, dir) = locks_dir();
        write_foreign_lock(&dir, "dspace-docker", DEAD_PID, Duration::seconds(120));

        let lock = RunLock::acquire(&dir, "dspace-docker", false, Some(60)).unwrap();
        assert_eq!(lock.info().pid, process::id());
    }

    #[test]
    fn test_corrupted_lock_reported_unless_forced() {
        let (_td, dir) = locks_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(RunLock::lock_path(&dir, "koha-docker"), "{ not json").unwrap();

        let err = RunLock::acquire(&dir, "koha-docker", false, None).unwrap_err();
        assert!(matches!(err, LockError::Corrupted { .. }));
        assert!(RunLock::acquire(&dir, "koha-docker", true, None).is_ok());
    }

    #[test]
    fn test_lock_path_sanitizes_plan_name() {
        let dir = Utf8PathBuf::from("/state/locks");
        assert_eq!(
            RunLock::lock_path(&dir, "../evil plan"),
            Utf8PathBuf::from("/state/locks/___evil_plan.lock")
        );
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(5), "5s");
        assert_eq!(format_age(125), "2m");
        assert_eq!(format_age(7200), "2h");
        assert_eq!(format_age(172_800), "2d");
    }
}
