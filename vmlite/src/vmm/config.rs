//! On-disk configuration (`vmlite.json`).
//!
//! Every field has a default, so a partial document (or none at all) is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vmlite_shared::constants::{self, rootfs as rootfs_defaults, timeouts};
use vmlite_shared::errors::{VmliteError, VmliteResult};

use super::spec::LaunchOverrides;
use crate::assets::KernelBuildOptions;

/// Pre-built kernel published alongside cloud-hypervisor's kernel fork.
pub const DEFAULT_KERNEL_URL: &str =
    "https://github.com/cloud-hypervisor/linux/releases/download/ch-release-v6.2-20240908/vmlinux";

/// A download location, optionally pinned to a SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl SourceEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sha256: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    /// Tried in order before falling back to a source build.
    pub sources: Vec<SourceEntry>,
    /// `None` disables the source-build fallback.
    pub build: Option<KernelBuildOptions>,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            sources: vec![SourceEntry::new(DEFAULT_KERNEL_URL)],
            build: Some(KernelBuildOptions::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootfsSettings {
    pub busybox: SourceEntry,
    pub applets: Vec<String>,
}

impl Default for RootfsSettings {
    fn default() -> Self {
        Self {
            busybox: SourceEntry::new(rootfs_defaults::DEFAULT_BUSYBOX_URL),
            applets: rootfs_defaults::DEFAULT_APPLETS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmmSettings {
    /// Binary name (looked up on PATH) or path.
    pub binary: String,
    pub api_timeout_secs: u64,
    pub start_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub download_timeout_secs: u64,
    /// Check `/dev/kvm` before launching.
    pub require_kvm: bool,
}

impl Default for VmmSettings {
    fn default() -> Self {
        Self {
            binary: constants::DEFAULT_VMM_BINARY.to_string(),
            api_timeout_secs: timeouts::API_SECS,
            start_timeout_secs: timeouts::START_SECS,
            shutdown_timeout_secs: timeouts::SHUTDOWN_SECS,
            download_timeout_secs: timeouts::DOWNLOAD_SECS,
            require_kvm: true,
        }
    }
}

impl VmmSettings {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmliteConfig {
    pub kernel: KernelSettings,
    pub rootfs: RootfsSettings,
    pub vm: LaunchOverrides,
    pub vmm: VmmSettings,
}

impl VmliteConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> VmliteResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(VmliteError::Config(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            VmliteError::Config(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Write as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> VmliteResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VmliteError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json + "\n").map_err(|e| {
            VmliteError::Storage(format!("failed to write {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Layer `overrides` over the `vm` section.
    pub fn update_vm(&mut self, overrides: LaunchOverrides) {
        tracing::info!(?overrides, "Updating VM configuration");
        self.vm = std::mem::take(&mut self.vm).merge(overrides);
    }

    fn validate(&self) -> VmliteResult<()> {
        if self.vmm.binary.trim().is_empty() {
            return Err(VmliteError::Config("vmm.binary must not be empty".into()));
        }
        for (name, secs) in [
            ("vmm.api_timeout_secs", self.vmm.api_timeout_secs),
            ("vmm.start_timeout_secs", self.vmm.start_timeout_secs),
            ("vmm.shutdown_timeout_secs", self.vmm.shutdown_timeout_secs),
            ("vmm.download_timeout_secs", self.vmm.download_timeout_secs),
        ] {
            if secs == 0 {
                return Err(VmliteError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}
