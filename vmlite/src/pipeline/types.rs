//! Typed inputs and outputs of the provisioning stages.

use std::path::{Path, PathBuf};

use crate::assets::{KernelAsset, KernelResolver};
use crate::lifecycle::ControllerOptions;
use crate::rootfs::{RootfsAsset, RootfsBuilder};
use crate::vmm::{DiskSpec, LaunchOverrides, LaunchSpec};

pub struct KernelInput<'a> {
    pub resolver: &'a KernelResolver,
    pub dest: &'a Path,
}

pub struct RootfsInput<'a> {
    pub builder: &'a RootfsBuilder,
    pub target: &'a Path,
}

pub struct DisksInput<'a> {
    pub disks: &'a [DiskSpec],
}

pub struct PlanInput<'a> {
    pub kernel: &'a KernelAsset,
    pub rootfs: &'a RootfsAsset,
    pub overrides: &'a LaunchOverrides,
    pub api_socket: &'a Path,
    pub script_path: &'a Path,
    pub vmm_binary: &'a str,
}

pub struct SpawnInput<'a> {
    pub spec: &'a LaunchSpec,
    pub options: ControllerOptions,
    pub require_kvm: bool,
}

/// Everything a successful provisioning run produced.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub kernel: KernelAsset,
    pub rootfs: RootfsAsset,
    pub spec: LaunchSpec,
    pub script: PathBuf,
}
