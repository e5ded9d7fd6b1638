//! Filesystem helpers shared across modules.
//!
//! These helpers attach the operation and path to IO errors.

use std::path::Path;

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_path(op, path, e))
}

/// Ensure the parent directory of a file path exists.
pub fn ensure_parent_dir_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_all_sync_with_op(op, parent),
        _ => Ok(()),
    }
}
