//! Guest root filesystem: a busybox initramfs packed as gzip-compressed newc cpio.

mod builder;
mod cpio;

pub use builder::{INIT_SCRIPT, RootfsAsset, RootfsBuilder};
pub use cpio::{CpioWriter, append_tree};
