//! Initramfs construction.
//!
//! The tree is assembled in a staging directory next to the target, archived
//! into a sibling `.part` file and renamed onto the target, so the target path
//! only ever holds a complete archive.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use vmlite_shared::errors::{VmliteError, VmliteResult};

use super::cpio::{CpioWriter, append_tree};
use crate::assets::ArtifactSource;
use crate::util::set_mode;

const SKELETON_DIRS: &[&str] = &[
    "bin", "sbin", "etc", "proc", "sys", "dev", "tmp", "root", "usr", "usr/bin", "usr/sbin",
];

pub const INIT_SCRIPT: &str = "#!/bin/sh
mount -t proc proc /proc
mount -t sysfs sysfs /sys
mount -t devtmpfs devtmpfs /dev
echo \"vmlite: guest userspace ready\"
exec /bin/sh
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootfsAsset {
    pub path: PathBuf,
    /// False when an existing image was kept as-is.
    pub built: bool,
}

pub struct RootfsBuilder {
    busybox: Box<dyn ArtifactSource>,
    applets: Vec<String>,
}

impl RootfsBuilder {
    pub fn new(busybox: Box<dyn ArtifactSource>, applets: Vec<String>) -> Self {
        Self { busybox, applets }
    }

    /// Build the initramfs at `target` unless it already exists.
    pub async fn ensure_rootfs(&self, target: &Path) -> VmliteResult<RootfsAsset> {
        if target.exists() {
            tracing::info!(rootfs = %target.display(), "Rootfs image exists, skipping build");
            return Ok(RootfsAsset {
                path: target.to_path_buf(),
                built: false,
            });
        }

        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| {
            VmliteError::Storage(format!("failed to create {}: {}", parent.display(), e))
        })?;

        // Removed on drop, whichever way this function exits.
        let staging = tempfile::Builder::new()
            .prefix(".rootfs-staging-")
            .tempdir_in(parent)
            .map_err(|e| {
                VmliteError::Storage(format!("failed to create staging directory: {}", e))
            })?;

        self.populate(staging.path()).await?;

        let part = crate::assets::part_path(target);
        let mut guard = PartialFile::new(part.clone());
        write_archive(staging.path(), &part)?;
        std::fs::rename(&part, target).map_err(|e| {
            VmliteError::Storage(format!(
                "failed to move rootfs into place at {}: {}",
                target.display(),
                e
            ))
        })?;
        guard.disarm();

        tracing::info!(rootfs = %target.display(), "✅ Rootfs image built");
        Ok(RootfsAsset {
            path: target.to_path_buf(),
            built: true,
        })
    }

    async fn populate(&self, root: &Path) -> VmliteResult<()> {
        for dir in SKELETON_DIRS {
            let path = root.join(dir);
            std::fs::create_dir_all(&path).map_err(|e| {
                VmliteError::Storage(format!("failed to create {}: {}", path.display(), e))
            })?;
        }

        let busybox = root.join("bin/busybox");
        tracing::info!(source = %self.busybox.describe(), "Fetching busybox");
        self.busybox.fetch(&busybox).await?;
        set_mode(&busybox, 0o755)?;

        let mut linked = 0;
        for applet in self.applet_names() {
            let link = root.join("bin").join(applet);
            if link.exists() {
                continue;
            }
            match std::os::unix::fs::symlink("busybox", &link) {
                Ok(()) => linked += 1,
                Err(e) => {
                    tracing::warn!(applet = %applet, error = %e, "Failed to link applet, skipping")
                }
            }
        }
        tracing::debug!(applets = linked, "Linked busybox applets");

        let init = root.join("init");
        std::fs::write(&init, INIT_SCRIPT).map_err(|e| {
            VmliteError::Storage(format!("failed to write {}: {}", init.display(), e))
        })?;
        set_mode(&init, 0o755)
    }

    /// Configured applets, with `sh` always present since `/init` needs it.
    fn applet_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.applets.iter().map(String::as_str).collect();
        if !names.contains(&"sh") {
            names.insert(0, "sh");
        }
        names.retain(|name| !name.is_empty() && !name.contains('/') && *name != "busybox");
        names
    }
}

fn write_archive(tree: &Path, dest: &Path) -> VmliteResult<()> {
    let storage_err =
        |e: std::io::Error| VmliteError::Storage(format!("failed to write {}: {}", dest.display(), e));

    let file = File::create(dest).map_err(storage_err)?;
    let mut writer = CpioWriter::new(GzEncoder::new(file, Compression::default()));
    append_tree(&mut writer, tree).map_err(storage_err)?;
    // Unprivileged builds cannot mknod; the kernel needs a console node before devtmpfs.
    if !tree.join("dev/console").exists() {
        writer
            .append_char_device("dev/console", 0o600, 5, 1)
            .map_err(storage_err)?;
    }
    let encoder = writer.finish().map_err(storage_err)?;
    let mut file = encoder.finish().map_err(storage_err)?;
    file.flush().map_err(storage_err)?;
    file.sync_all().map_err(storage_err)
}

/// Removes a partially written file unless disarmed.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
