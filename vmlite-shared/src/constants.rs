//! Default values for the launched microVM and the working directory.

/// Environment variable that overrides the working directory.
pub const VMLITE_HOME_ENV: &str = "VMLITE_HOME";

/// Directory under the user's home used when no working directory is given.
pub const DEFAULT_HOME_DIR: &str = ".vmlite";

pub const DEFAULT_VMM_BINARY: &str = "cloud-hypervisor";

pub mod vm {
    pub const DEFAULT_CMDLINE: &str = "console=ttyS0 reboot=k panic=1 rdinit=/init";
    pub const DEFAULT_BOOT_VCPUS: u8 = 2;
    pub const DEFAULT_MEMORY_MIB: u64 = 256;
}

pub mod timeouts {
    pub const API_SECS: u64 = 5;
    pub const START_SECS: u64 = 10;
    pub const SHUTDOWN_SECS: u64 = 10;
    pub const DOWNLOAD_SECS: u64 = 60;
}

pub mod kernel {
    pub const DEFAULT_GIT_URL: &str = "https://github.com/cloud-hypervisor/linux.git";
    pub const DEFAULT_GIT_BRANCH: &str = "ch-6.2";
    pub const DEFAULT_DEFCONFIG: &str = "x86_64_defconfig";

    /// Options enabled on top of the preset so the kernel boots under the VMM.
    pub const REQUIRED_OPTIONS: &[&str] = &[
        "PVH",
        "PARAVIRT",
        "KVM_GUEST",
        "VIRTIO",
        "VIRTIO_PCI",
        "VIRTIO_BLK",
        "VIRTIO_NET",
        "VIRTIO_CONSOLE",
        "BLK_DEV_INITRD",
        "DEVTMPFS",
    ];

    /// Packages installed before the build when the host uses apt.
    pub const BUILD_PACKAGES: &[&str] = &[
        "build-essential",
        "flex",
        "bison",
        "bc",
        "libelf-dev",
        "libssl-dev",
        "git",
    ];
}

pub mod rootfs {
    pub const DEFAULT_BUSYBOX_URL: &str =
        "https://busybox.net/downloads/binaries/1.35.0-x86_64-linux-musl/busybox";

    pub const DEFAULT_APPLETS: &[&str] = &[
        "sh", "ash", "ls", "cat", "echo", "mount", "umount", "mkdir", "rm", "cp", "mv", "ps",
        "kill", "dmesg", "ip", "ifconfig", "poweroff", "reboot", "sleep", "uname", "vi",
    ];
}
