use std::path::{Path, PathBuf};

use vmlite_shared::constants::{DEFAULT_HOME_DIR, VMLITE_HOME_ENV};
use vmlite_shared::errors::{VmliteError, VmliteResult};

/// Names inside the working directory.
pub mod dirs {
    pub const SOCKETS_DIR: &str = "sockets";
    pub const LOGS_DIR: &str = "logs";
    pub const BUILD_DIR: &str = "build";
    pub const DISKS_DIR: &str = "disks";

    pub const KERNEL_FILE: &str = "vmlinux";
    pub const ROOTFS_FILE: &str = "initramfs.cpio.gz";
    pub const LAUNCH_SCRIPT: &str = "launch.sh";
    pub const CONFIG_FILE: &str = "vmlite.json";
    pub const API_SOCKET: &str = "api.sock";
    pub const VMM_LOG: &str = "vmm.log";
}

/// Paths of every artifact a pipeline run produces.
///
/// ```text
/// <root>/
///   vmlinux
///   initramfs.cpio.gz
///   launch.sh
///   vmlite.json
///   sockets/api.sock
///   logs/vmm.log
///   build/        kernel source checkout
///   disks/
///   .lock
/// ```
#[derive(Clone, Debug)]
pub struct WorkDirLayout {
    root: PathBuf,
}

impl WorkDirLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the working directory: explicit path, then `VMLITE_HOME`, then
    /// `~/.vmlite`.
    pub fn resolve(explicit: Option<&Path>) -> VmliteResult<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        if let Some(path) = std::env::var_os(VMLITE_HOME_ENV) {
            return Ok(Self::new(PathBuf::from(path)));
        }
        let home = ::dirs::home_dir().ok_or_else(|| {
            VmliteError::Config(format!(
                "cannot determine home directory; set {}",
                VMLITE_HOME_ENV
            ))
        })?;
        Ok(Self::new(home.join(DEFAULT_HOME_DIR)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kernel_path(&self) -> PathBuf {
        self.root.join(dirs::KERNEL_FILE)
    }

    pub fn rootfs_path(&self) -> PathBuf {
        self.root.join(dirs::ROOTFS_FILE)
    }

    pub fn launch_script_path(&self) -> PathBuf {
        self.root.join(dirs::LAUNCH_SCRIPT)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(dirs::CONFIG_FILE)
    }

    pub fn sockets_dir(&self) -> PathBuf {
        self.root.join(dirs::SOCKETS_DIR)
    }

    pub fn api_socket_path(&self) -> PathBuf {
        self.sockets_dir().join(dirs::API_SOCKET)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(dirs::LOGS_DIR)
    }

    pub fn vmm_log_path(&self) -> PathBuf {
        self.logs_dir().join(dirs::VMM_LOG)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.join(dirs::BUILD_DIR)
    }

    pub fn disks_dir(&self) -> PathBuf {
        self.root.join(dirs::DISKS_DIR)
    }

    /// Create every directory of the layout.
    pub fn prepare(&self) -> VmliteResult<()> {
        for dir in [
            self.root.clone(),
            self.sockets_dir(),
            self.logs_dir(),
            self.build_dir(),
            self.disks_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                VmliteError::Storage(format!(
                    "failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_under_root() {
        let layout = WorkDirLayout::new("/srv/vm");
        assert_eq!(layout.kernel_path(), PathBuf::from("/srv/vm/vmlinux"));
        assert_eq!(
            layout.rootfs_path(),
            PathBuf::from("/srv/vm/initramfs.cpio.gz")
        );
        assert_eq!(
            layout.api_socket_path(),
            PathBuf::from("/srv/vm/sockets/api.sock")
        );
        assert_eq!(layout.vmm_log_path(), PathBuf::from("/srv/vm/logs/vmm.log"));
    }

    #[test]
    fn test_prepare_creates_dirs() {
        let temp = TempDir::new().unwrap();
        let layout = WorkDirLayout::new(temp.path().join("work"));
        layout.prepare().unwrap();

        assert!(layout.sockets_dir().is_dir());
        assert!(layout.logs_dir().is_dir());
        assert!(layout.build_dir().is_dir());
        assert!(layout.disks_dir().is_dir());
    }

    #[test]
    fn test_resolve_prefers_explicit_path() {
        let layout = WorkDirLayout::resolve(Some(Path::new("/explicit"))).unwrap();
        assert_eq!(layout.root(), Path::new("/explicit"));
    }
}
