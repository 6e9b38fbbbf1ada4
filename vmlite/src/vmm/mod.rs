//! Everything about the VMM process before it runs: configuration, launch
//! planning, disk images and host preflight.

pub mod config;
pub mod disk;
pub mod host_check;
mod spec;

pub use config::{KernelSettings, RootfsSettings, SourceEntry, VmliteConfig, VmmSettings};
pub use spec::{
    ConsoleMode, DiskSpec, LaunchOverrides, LaunchSpec, NetSpec, VsockSpec, build_launch_spec,
};
