//! Provisioning stages.
//!
//! Each stage is a function with typed input and output, run in order:
//!
//! ```text
//! Kernel ──→ Rootfs ──→ Disks ──→ Plan ──→ Spawn
//! ```
//!
//! The first failing stage ends the run.

pub mod disks;
pub mod kernel;
pub mod plan;
pub mod rootfs;
pub mod spawn;
