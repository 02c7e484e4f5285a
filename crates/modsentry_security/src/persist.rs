//! Atomic file replacement.
//!
//! Readers see either the old file or the new one, never a torn write:
//! write to a temp file in the same directory, fsync, rename over.

use crate::error::{GuardError, GuardResult};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replaces `path` with `bytes`, creating parent directories.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> GuardResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| GuardError::storage(dir, e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| GuardError::storage(dir, e))?;
    temp.as_file_mut()
        .write_all(bytes)
        .map_err(|e| GuardError::storage(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| GuardError::storage(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| GuardError::storage(path, e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_replaces_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("CheckSum_init");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"second");
        let leftovers = fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
