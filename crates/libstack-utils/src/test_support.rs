//! Shared helpers for libstack tests. Not part of the public API.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

/// A temporary directory together with its UTF-8 path.
#[must_use]
pub fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
    let td = TempDir::new().expect("create temp dir");
    let path = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).expect("utf-8 temp dir");
    (td, path)
}

/// Write `content` to `root/rel`, creating parent directories.
pub fn write_file(root: &Utf8Path, rel: &str, content: &str) -> Utf8PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, content).expect("write test file");
    path
}
