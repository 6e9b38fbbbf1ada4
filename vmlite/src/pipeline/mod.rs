//! Provisioning pipeline.
//!
//! ```text
//! Provisioner::provision()
//!   ├─ WorkDirLock::acquire
//!   ├─ layout.prepare()
//!   ├─ Stage 1: kernel  (reuse → download candidates → source build)
//!   ├─ Stage 2: rootfs  (busybox initramfs, skipped when present)
//!   ├─ Stage 3: disks   (sparse images for sized disks)
//!   └─ Stage 4: plan    (LaunchSpec + launch.sh)
//!
//! Provisioner::launch()
//!   ├─ provision()
//!   └─ Stage 5: spawn   (KVM preflight, VMM process, API readiness)
//! ```
//!
//! The lock is held until the VMM is up, so two runs against one working
//! directory never interleave.

mod stages;
mod types;

pub use types::Provisioned;

use vmlite_shared::errors::VmliteResult;

use crate::assets::{KernelResolver, SourceBuild, source_from_location};
use crate::lifecycle::{ControllerOptions, VmController};
use crate::rootfs::RootfsBuilder;
use crate::runtime::{WorkDirLayout, WorkDirLock};
use crate::vmm::{LaunchOverrides, VmliteConfig};
use types::{DisksInput, KernelInput, PlanInput, RootfsInput, SpawnInput};

/// Drives asset preparation and VM launch for one working directory.
pub struct Provisioner {
    layout: WorkDirLayout,
    config: VmliteConfig,
    kernel: KernelResolver,
    rootfs: RootfsBuilder,
}

impl Provisioner {
    /// Wire the kernel resolver and rootfs builder from `config`.
    pub fn new(layout: WorkDirLayout, config: VmliteConfig) -> Self {
        let timeout = config.vmm.download_timeout();

        let sources = config
            .kernel
            .sources
            .iter()
            .map(|entry| source_from_location(&entry.url, entry.sha256.as_deref(), timeout))
            .collect();
        let mut kernel = KernelResolver::new(sources);
        if let Some(options) = &config.kernel.build {
            kernel = kernel.with_builder(Box::new(SourceBuild::new(
                options.clone(),
                layout.build_dir(),
            )));
        }

        let busybox = &config.rootfs.busybox;
        let rootfs = RootfsBuilder::new(
            source_from_location(&busybox.url, busybox.sha256.as_deref(), timeout),
            config.rootfs.applets.clone(),
        );

        Self {
            layout,
            config,
            kernel,
            rootfs,
        }
    }

    pub fn with_kernel_resolver(mut self, resolver: KernelResolver) -> Self {
        self.kernel = resolver;
        self
    }

    pub fn with_rootfs_builder(mut self, builder: RootfsBuilder) -> Self {
        self.rootfs = builder;
        self
    }

    pub fn layout(&self) -> &WorkDirLayout {
        &self.layout
    }

    pub fn config(&self) -> &VmliteConfig {
        &self.config
    }

    /// Prepare kernel, rootfs, disks and the launch spec.
    ///
    /// `overrides` are layered over the `vm` section of the config.
    pub async fn provision(&self, overrides: LaunchOverrides) -> VmliteResult<Provisioned> {
        let _lock = WorkDirLock::acquire(self.layout.root())?;
        self.provision_locked(overrides).await
    }

    /// Provision, then start the VMM.
    ///
    /// The returned controller owns the child process.
    pub async fn launch(
        &self,
        overrides: LaunchOverrides,
    ) -> VmliteResult<(Provisioned, VmController)> {
        let _lock = WorkDirLock::acquire(self.layout.root())?;
        let provisioned = self.provision_locked(overrides).await?;

        let options =
            ControllerOptions::from_settings(&self.config.vmm, Some(self.layout.vmm_log_path()));
        let controller = stages::spawn::run(SpawnInput {
            spec: &provisioned.spec,
            options,
            require_kvm: self.config.vmm.require_kvm,
        })
        .await?;

        tracing::info!(
            socket = %provisioned.spec.api_socket().display(),
            "✅ VM launched"
        );
        Ok((provisioned, controller))
    }

    async fn provision_locked(&self, overrides: LaunchOverrides) -> VmliteResult<Provisioned> {
        self.layout.prepare()?;
        let overrides = self.config.vm.clone().merge(overrides);

        let kernel_path = self.layout.kernel_path();
        let kernel = stages::kernel::run(KernelInput {
            resolver: &self.kernel,
            dest: &kernel_path,
        })
        .await?;

        let rootfs_path = self.layout.rootfs_path();
        let rootfs = stages::rootfs::run(RootfsInput {
            builder: &self.rootfs,
            target: &rootfs_path,
        })
        .await?;

        let created = stages::disks::run(DisksInput {
            disks: &overrides.disks,
        })
        .await?;
        if created > 0 {
            tracing::info!(created, "Disk images created");
        }

        let api_socket = self.layout.api_socket_path();
        let script = self.layout.launch_script_path();
        let spec = stages::plan::run(PlanInput {
            kernel: &kernel,
            rootfs: &rootfs,
            overrides: &overrides,
            api_socket: &api_socket,
            script_path: &script,
            vmm_binary: &self.config.vmm.binary,
        })
        .await?;

        tracing::info!(
            kernel = %kernel.path.display(),
            rootfs = %rootfs.path.display(),
            "✅ Provisioning complete"
        );
        Ok(Provisioned {
            kernel,
            rootfs,
            spec,
            script,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{KernelBuilder, LocalSource};
    use async_trait::async_trait;
    use std::path::Path;
    use vmlite_shared::errors::VmliteError;

    struct WriteKernel;

    #[async_trait]
    impl KernelBuilder for WriteKernel {
        async fn build(&self, dest: &Path) -> VmliteResult<()> {
            std::fs::write(dest, b"built-vmlinux").map_err(|e| VmliteError::Internal(e.to_string()))
        }
    }

    fn provisioner(root: &Path, busybox: &Path) -> Provisioner {
        let layout = WorkDirLayout::new(root);
        let mut config = VmliteConfig::default();
        config.kernel.sources.clear();
        config.kernel.build = None;
        Provisioner::new(layout, config)
            .with_kernel_resolver(KernelResolver::new(Vec::new()).with_builder(Box::new(WriteKernel)))
            .with_rootfs_builder(RootfsBuilder::new(
                Box::new(LocalSource::new(busybox)),
                vec!["sh".to_string(), "ls".to_string()],
            ))
    }

    #[tokio::test]
    async fn test_provision_produces_all_artifacts() {
        let temp = tempfile::tempdir().unwrap();
        let busybox = temp.path().join("busybox-bin");
        std::fs::write(&busybox, b"#!/bin/sh\n").unwrap();
        let root = temp.path().join("work");

        let p = provisioner(&root, &busybox);
        let out = p.provision(LaunchOverrides::default()).await.unwrap();

        assert_eq!(out.kernel.path, root.join("vmlinux"));
        assert!(out.rootfs.built);
        assert!(out.script.exists());
        let script = std::fs::read_to_string(&out.script).unwrap();
        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains("--api-socket"));
        assert_eq!(out.spec.api_socket(), root.join("sockets").join("api.sock"));
    }

    #[tokio::test]
    async fn test_provision_is_rerunnable() {
        let temp = tempfile::tempdir().unwrap();
        let busybox = temp.path().join("busybox-bin");
        std::fs::write(&busybox, b"#!/bin/sh\n").unwrap();
        let root = temp.path().join("work");

        let p = provisioner(&root, &busybox);
        p.provision(LaunchOverrides::default()).await.unwrap();
        let second = p.provision(LaunchOverrides::default()).await.unwrap();

        assert_eq!(second.kernel.origin, crate::assets::KernelOrigin::Existing);
        assert!(!second.rootfs.built);
    }

    #[tokio::test]
    async fn test_overrides_flow_into_spec() {
        let temp = tempfile::tempdir().unwrap();
        let busybox = temp.path().join("busybox-bin");
        std::fs::write(&busybox, b"#!/bin/sh\n").unwrap();
        let root = temp.path().join("work");

        let p = provisioner(&root, &busybox);
        let overrides = LaunchOverrides {
            vcpus: Some(4),
            memory_mib: Some(512),
            ..Default::default()
        };
        let out = p.provision(overrides).await.unwrap();

        assert_eq!(out.spec.vcpus(), 4);
        assert_eq!(out.spec.memory_mib(), 512);
    }

    #[tokio::test]
    async fn test_provision_rejects_held_lock() {
        let temp = tempfile::tempdir().unwrap();
        let busybox = temp.path().join("busybox-bin");
        std::fs::write(&busybox, b"#!/bin/sh\n").unwrap();
        let root = temp.path().join("work");
        std::fs::create_dir_all(&root).unwrap();

        let _held = WorkDirLock::acquire(&root).unwrap();
        let p = provisioner(&root, &busybox);
        let err = p.provision(LaunchOverrides::default()).await.unwrap_err();
        assert!(matches!(err, VmliteError::StateConflict(_)));
    }
}
