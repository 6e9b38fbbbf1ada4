//! vmlite - provision and control a single cloud-hypervisor microVM.
//!
//! The crate prepares a guest kernel and a busybox initramfs, plans the
//! VMM invocation, spawns cloud-hypervisor and drives it over its REST
//! API on a Unix socket.

pub mod api;
pub mod assets;
pub mod lifecycle;
pub mod pipeline;
pub mod rootfs;
pub mod runtime;
pub mod util;
pub mod vmm;

pub use api::ApiClient;
pub use assets::{KernelAsset, KernelOrigin, KernelResolver};
pub use lifecycle::{ControllerOptions, VmController, VmState, VmStatus};
pub use pipeline::{Provisioned, Provisioner};
pub use rootfs::{RootfsAsset, RootfsBuilder};
pub use runtime::{WorkDirLayout, WorkDirLock};
pub use vmm::{ConsoleMode, DiskSpec, LaunchOverrides, LaunchSpec, VmliteConfig};

// Re-exported so callers need only one crate for errors.
pub use vmlite_shared::{VmliteError, VmliteResult};
