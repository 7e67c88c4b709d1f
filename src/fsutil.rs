//! File helpers shared by the file-backed adapters.

use crate::error::{BoardError, BoardResult};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

const TMP_EXTENSION: &str = "taskboard.tmp";

/// Read a whole source file; a missing file is `SOURCE_NOT_FOUND`.
pub fn read_source(path: &Path) -> BoardResult<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(BoardError::source_not_found(&path.display().to_string()))
        }
        Err(e) => Err(BoardError::io(format!("{}: {}", path.display(), e))),
    }
}

/// Replace `path` with `content`: write to a sibling temp file, fsync, rename.
///
/// A symlinked `path` is resolved first so the link survives, and the
/// temp file takes over the permissions of the file it replaces.
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let target = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == io::ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(e),
    };
    let permissions = fs::metadata(&target).ok().map(|meta| meta.permissions());

    let tmp_path = target.with_extension(TMP_EXTENSION);
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    if let Some(permissions) = permissions {
        fs::set_permissions(&tmp_path, permissions)?;
    }
    fs::rename(&tmp_path, &target)?;

    // fsync directory for rename durability
    if let Some(dir) = target.parent() {
        if let Ok(d) = fs::File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(())
}

/// Create a new file; fails with `PATH_CONFLICT` if it already exists.
pub fn create_new(path: &Path, content: &str) -> BoardResult<()> {
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(BoardError::path_conflict(&path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Modification time of a file, or of the newest entry of a directory.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    let meta = fs::metadata(path).ok()?;
    let own = meta.modified().ok();
    if !meta.is_dir() {
        return own;
    }
    let newest_entry = fs::read_dir(path)
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.metadata().ok()?.modified().ok())
        .max();
    own.into_iter().chain(newest_entry).max()
}
