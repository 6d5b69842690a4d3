// src/dag/path_utils.rs

//! Utility functions for turning artifact paths into graph keys.

use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against `base` and normalize it lexically.
///
/// `.` components are dropped and `..` pops the previous component. The
/// filesystem is never consulted, so artifacts that do not exist yet (the
/// usual case for targets) normalize the same way as existing ones.
pub fn absolute_from(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `pop` on "/" is a no-op, matching how `/..` resolves.
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Like [`absolute_from`], relative to the current working directory.
///
/// Falls back to "/" if the working directory cannot be determined.
pub fn absolute(path: &Path) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    absolute_from(&cwd, path)
}
