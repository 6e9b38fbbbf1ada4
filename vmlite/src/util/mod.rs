mod process;

pub use process::{find_executable, is_process_alive, kill_process};

use std::path::Path;

use vmlite_shared::errors::{VmliteError, VmliteResult};

/// Set Unix permission bits on a file.
pub fn set_mode(path: &Path, mode: u32) -> VmliteResult<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        VmliteError::Storage(format!(
            "failed to set mode {:o} on {}: {}",
            mode,
            path.display(),
            e
        ))
    })
}

/// True when `path` is a regular file with at least one byte.
pub fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Remove a file, treating "already gone" as success.
pub fn remove_file_if_exists(path: &Path) -> VmliteResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(VmliteError::Storage(format!(
            "failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
