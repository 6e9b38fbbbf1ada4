//! Sparse raw disk images for `--disk` attachments.

use std::fs::OpenOptions;

use vmlite_shared::errors::{VmliteError, VmliteResult};

use super::spec::DiskSpec;

/// Create the image for `disk` when it is missing and a size is given.
///
/// Existing images are never resized. Returns `true` when a file was created.
pub fn ensure_disk(disk: &DiskSpec) -> VmliteResult<bool> {
    if disk.path.exists() {
        return Ok(false);
    }
    let Some(size_mib) = disk.size_mib else {
        return Ok(false);
    };
    if size_mib == 0 {
        return Err(VmliteError::Config(format!(
            "disk {} has zero size",
            disk.path.display()
        )));
    }

    if let Some(parent) = disk.path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            VmliteError::Storage(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&disk.path)
        .map_err(|e| {
            VmliteError::Storage(format!(
                "failed to create disk {}: {}",
                disk.path.display(),
                e
            ))
        })?;
    file.set_len(size_mib * 1024 * 1024).map_err(|e| {
        let _ = std::fs::remove_file(&disk.path);
        VmliteError::Storage(format!(
            "failed to size disk {}: {}",
            disk.path.display(),
            e
        ))
    })?;

    tracing::info!(disk = %disk.path.display(), size_mib, "Created sparse disk image");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_sized_image() {
        let temp = TempDir::new().unwrap();
        let disk = DiskSpec {
            path: temp.path().join("disks/data.img"),
            readonly: false,
            size_mib: Some(8),
        };

        assert!(ensure_disk(&disk).unwrap());
        assert_eq!(std::fs::metadata(&disk.path).unwrap().len(), 8 * 1024 * 1024);
    }

    #[test]
    fn test_existing_image_untouched() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.img");
        std::fs::write(&path, b"abc").unwrap();
        let disk = DiskSpec {
            path: path.clone(),
            readonly: false,
            size_mib: Some(8),
        };

        assert!(!ensure_disk(&disk).unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_missing_without_size_is_left_alone() {
        let temp = TempDir::new().unwrap();
        let disk = DiskSpec {
            path: temp.path().join("absent.img"),
            readonly: true,
            size_mib: None,
        };
        assert!(!ensure_disk(&disk).unwrap());
        assert!(!disk.path.exists());
    }
}
