//! Launch planning: defaults plus overrides become an immutable [`LaunchSpec`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vmlite_shared::constants::vm as defaults;
use vmlite_shared::errors::{VmliteError, VmliteResult};

use crate::assets::KernelAsset;
use crate::rootfs::RootfsAsset;

/// Destination of the serial port or virtio console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConsoleMode {
    Off,
    Null,
    Tty,
    Pty,
    File(PathBuf),
}

impl FromStr for ConsoleMode {
    type Err = VmliteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ConsoleMode::Off),
            "null" => Ok(ConsoleMode::Null),
            "tty" => Ok(ConsoleMode::Tty),
            "pty" => Ok(ConsoleMode::Pty),
            other => match other.strip_prefix("file=") {
                Some(path) if !path.is_empty() => Ok(ConsoleMode::File(PathBuf::from(path))),
                _ => Err(VmliteError::Config(format!(
                    "invalid console mode '{}': expected off, null, tty, pty or file=<path>",
                    other
                ))),
            },
        }
    }
}

impl fmt::Display for ConsoleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleMode::Off => write!(f, "off"),
            ConsoleMode::Null => write!(f, "null"),
            ConsoleMode::Tty => write!(f, "tty"),
            ConsoleMode::Pty => write!(f, "pty"),
            ConsoleMode::File(path) => write!(f, "file={}", path.display()),
        }
    }
}

impl TryFrom<String> for ConsoleMode {
    type Error = VmliteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConsoleMode> for String {
    fn from(mode: ConsoleMode) -> Self {
        mode.to_string()
    }
}

/// A block device attached with `--disk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub readonly: bool,
    /// Create a sparse image of this size when `path` is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_mib: Option<u64>,
}

/// A TAP-backed network device attached with `--net`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VsockSpec {
    pub cid: u32,
    pub socket: PathBuf,
}

/// Caller-supplied settings layered over the defaults.
///
/// This is also the `vm` section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_vcpus: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mib: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmdline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<ConsoleMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console: Option<ConsoleMode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<DiskSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub net: Vec<NetSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balloon_mib: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vsock: Option<VsockSpec>,
}

impl LaunchOverrides {
    /// Layer `other` on top of `self`; set fields of `other` win, lists are
    /// replaced when non-empty.
    pub fn merge(mut self, other: LaunchOverrides) -> Self {
        self.vcpus = other.vcpus.or(self.vcpus);
        self.max_vcpus = other.max_vcpus.or(self.max_vcpus);
        self.memory_mib = other.memory_mib.or(self.memory_mib);
        self.cmdline = other.cmdline.or(self.cmdline);
        self.serial = other.serial.or(self.serial);
        self.console = other.console.or(self.console);
        if !other.disks.is_empty() {
            self.disks = other.disks;
        }
        if !other.net.is_empty() {
            self.net = other.net;
        }
        self.balloon_mib = other.balloon_mib.or(self.balloon_mib);
        self.vsock = other.vsock.or(self.vsock);
        self
    }
}

/// Everything needed to start the VMM. Built once by [`build_launch_spec`]
/// and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    kernel: PathBuf,
    initramfs: PathBuf,
    cmdline: String,
    vcpus: u8,
    max_vcpus: Option<u8>,
    memory_mib: u64,
    serial: ConsoleMode,
    console: ConsoleMode,
    api_socket: PathBuf,
    disks: Vec<DiskSpec>,
    net: Vec<NetSpec>,
    balloon_mib: Option<u64>,
    vsock: Option<VsockSpec>,
}

/// Combine resolved assets with defaults and overrides.
///
/// Fails with [`VmliteError::Config`] when an input file is missing or
/// unreadable, or a resource value is out of range.
pub fn build_launch_spec(
    kernel: &KernelAsset,
    rootfs: &RootfsAsset,
    overrides: &LaunchOverrides,
    api_socket: &Path,
) -> VmliteResult<LaunchSpec> {
    ensure_readable("kernel", &kernel.path)?;
    ensure_readable("rootfs", &rootfs.path)?;
    for disk in &overrides.disks {
        ensure_readable("disk", &disk.path)?;
    }

    let vcpus = overrides.vcpus.unwrap_or(defaults::DEFAULT_BOOT_VCPUS);
    if vcpus == 0 {
        return Err(VmliteError::Config("vcpus must be at least 1".to_string()));
    }
    match overrides.max_vcpus {
        Some(max) if max < vcpus => {
            return Err(VmliteError::Config(format!(
                "max_vcpus ({}) is below boot vcpus ({})",
                max, vcpus
            )));
        }
        _ => {}
    }

    let memory_mib = overrides.memory_mib.unwrap_or(defaults::DEFAULT_MEMORY_MIB);
    if memory_mib == 0 {
        return Err(VmliteError::Config("memory must be non-zero".to_string()));
    }
    match overrides.balloon_mib {
        Some(balloon) if balloon > memory_mib => {
            return Err(VmliteError::Config(format!(
                "balloon ({} MiB) exceeds guest memory ({} MiB)",
                balloon, memory_mib
            )));
        }
        _ => {}
    }

    Ok(LaunchSpec {
        kernel: kernel.path.clone(),
        initramfs: rootfs.path.clone(),
        cmdline: overrides
            .cmdline
            .clone()
            .unwrap_or_else(|| defaults::DEFAULT_CMDLINE.to_string()),
        vcpus,
        max_vcpus: overrides.max_vcpus,
        memory_mib,
        serial: overrides.serial.clone().unwrap_or(ConsoleMode::Tty),
        console: overrides.console.clone().unwrap_or(ConsoleMode::Off),
        api_socket: api_socket.to_path_buf(),
        disks: overrides.disks.clone(),
        net: overrides.net.clone(),
        balloon_mib: overrides.balloon_mib,
        vsock: overrides.vsock.clone(),
    })
}

fn ensure_readable(what: &str, path: &Path) -> VmliteResult<()> {
    std::fs::File::open(path).map(|_| ()).map_err(|e| {
        VmliteError::Config(format!("{} {} is not readable: {}", what, path.display(), e))
    })
}

impl LaunchSpec {
    pub fn kernel(&self) -> &Path {
        &self.kernel
    }

    pub fn initramfs(&self) -> &Path {
        &self.initramfs
    }

    pub fn cmdline(&self) -> &str {
        &self.cmdline
    }

    pub fn vcpus(&self) -> u8 {
        self.vcpus
    }

    pub fn max_vcpus(&self) -> Option<u8> {
        self.max_vcpus
    }

    pub fn memory_mib(&self) -> u64 {
        self.memory_mib
    }

    pub fn serial(&self) -> &ConsoleMode {
        &self.serial
    }

    pub fn console(&self) -> &ConsoleMode {
        &self.console
    }

    pub fn api_socket(&self) -> &Path {
        &self.api_socket
    }

    pub fn disks(&self) -> &[DiskSpec] {
        &self.disks
    }

    /// VMM command-line arguments, without the binary.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--kernel".to_string(),
            self.kernel.display().to_string(),
            "--initramfs".to_string(),
            self.initramfs.display().to_string(),
            "--cmdline".to_string(),
            self.cmdline.clone(),
            "--cpus".to_string(),
            match self.max_vcpus {
                Some(max) => format!("boot={},max={}", self.vcpus, max),
                None => format!("boot={}", self.vcpus),
            },
            "--memory".to_string(),
            format!("size={}M", self.memory_mib),
            "--serial".to_string(),
            self.serial.to_string(),
            "--console".to_string(),
            self.console.to_string(),
            "--api-socket".to_string(),
            self.api_socket.display().to_string(),
        ];

        for disk in &self.disks {
            let mut value = format!("path={}", disk.path.display());
            if disk.readonly {
                value.push_str(",readonly=on");
            }
            args.push("--disk".to_string());
            args.push(value);
        }

        for net in &self.net {
            let parts: Vec<String> = [
                ("tap", &net.tap),
                ("mac", &net.mac),
                ("ip", &net.ip),
                ("mask", &net.mask),
            ]
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| format!("{}={}", key, v)))
            .collect();
            args.push("--net".to_string());
            args.push(parts.join(","));
        }

        if let Some(balloon) = self.balloon_mib {
            args.push("--balloon".to_string());
            args.push(format!("size={}M", balloon));
        }

        if let Some(vsock) = &self.vsock {
            args.push("--vsock".to_string());
            args.push(format!("cid={},socket={}", vsock.cid, vsock.socket.display()));
        }

        args
    }

    /// A POSIX shell script that execs `binary` with [`Self::to_args`].
    pub fn render_script(&self, binary: &str) -> String {
        let mut script = String::from("#!/bin/sh\n# Generated by vmlite. Re-run `vmlite provision` to regenerate.\nexec ");
        script.push_str(&shell_quote(binary));
        for pair in self.to_args().chunks(2) {
            script.push_str(" \\\n    ");
            script.push_str(
                &pair
                    .iter()
                    .map(|arg| shell_quote(arg))
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
        script.push('\n');
        script
    }
}

/// Quote for POSIX sh. Plain words pass through untouched.
fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=,:@+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::KernelOrigin;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        kernel: KernelAsset,
        rootfs: RootfsAsset,
        socket: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let kernel = dir.path().join("vmlinux");
        let rootfs = dir.path().join("initramfs.cpio.gz");
        std::fs::write(&kernel, b"k").unwrap();
        std::fs::write(&rootfs, b"r").unwrap();
        let socket = dir.path().join("api.sock");
        Fixture {
            kernel: KernelAsset {
                path: kernel,
                origin: KernelOrigin::Existing,
            },
            rootfs: RootfsAsset {
                path: rootfs,
                built: false,
            },
            socket,
            _dir: dir,
        }
    }

    #[test]
    fn test_defaults() {
        let f = fixture();
        let spec =
            build_launch_spec(&f.kernel, &f.rootfs, &LaunchOverrides::default(), &f.socket)
                .unwrap();

        assert_eq!(spec.vcpus(), 2);
        assert_eq!(spec.memory_mib(), 256);
        assert_eq!(spec.cmdline(), "console=ttyS0 reboot=k panic=1 rdinit=/init");
        assert_eq!(spec.serial(), &ConsoleMode::Tty);
        assert_eq!(spec.console(), &ConsoleMode::Off);

        let args = spec.to_args();
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("--cpus") + 1], "boot=2");
        assert_eq!(args[pos("--memory") + 1], "size=256M");
        assert_eq!(args[pos("--serial") + 1], "tty");
        assert_eq!(args[pos("--console") + 1], "off");
        assert_eq!(args[pos("--api-socket") + 1], f.socket.display().to_string());
        assert!(!args.contains(&"--disk".to_string()));
    }

    #[test]
    fn test_overrides_applied() {
        let f = fixture();
        let disk = f.kernel.path.with_file_name("data.img");
        std::fs::write(&disk, b"").unwrap();
        let overrides = LaunchOverrides {
            vcpus: Some(1),
            max_vcpus: Some(4),
            memory_mib: Some(512),
            serial: Some(ConsoleMode::Pty),
            disks: vec![DiskSpec {
                path: disk.clone(),
                readonly: true,
                size_mib: None,
            }],
            net: vec![NetSpec {
                tap: Some("tap0".into()),
                ip: Some("192.168.249.1".into()),
                mask: Some("255.255.255.0".into()),
                mac: None,
            }],
            balloon_mib: Some(128),
            ..Default::default()
        };

        let args = build_launch_spec(&f.kernel, &f.rootfs, &overrides, &f.socket)
            .unwrap()
            .to_args();
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();

        assert_eq!(args[pos("--cpus") + 1], "boot=1,max=4");
        assert_eq!(args[pos("--memory") + 1], "size=512M");
        assert_eq!(args[pos("--serial") + 1], "pty");
        assert_eq!(
            args[pos("--disk") + 1],
            format!("path={},readonly=on", disk.display())
        );
        assert_eq!(
            args[pos("--net") + 1],
            "tap=tap0,ip=192.168.249.1,mask=255.255.255.0"
        );
        assert_eq!(args[pos("--balloon") + 1], "size=128M");
    }

    #[test]
    fn test_missing_kernel_is_config_error() {
        let f = fixture();
        let missing = KernelAsset {
            path: f.kernel.path.with_file_name("nope"),
            origin: KernelOrigin::Existing,
        };
        let err = build_launch_spec(&missing, &f.rootfs, &LaunchOverrides::default(), &f.socket)
            .unwrap_err();
        assert!(matches!(err, VmliteError::Config(_)));
        assert!(err.to_string().contains("kernel"));
    }

    #[test]
    fn test_missing_disk_is_config_error() {
        let f = fixture();
        let overrides = LaunchOverrides {
            disks: vec![DiskSpec {
                path: PathBuf::from("/nonexistent/disk.img"),
                readonly: false,
                size_mib: None,
            }],
            ..Default::default()
        };
        let err = build_launch_spec(&f.kernel, &f.rootfs, &overrides, &f.socket).unwrap_err();
        assert!(matches!(err, VmliteError::Config(_)));
    }

    #[test]
    fn test_invalid_resources_rejected() {
        let f = fixture();
        for overrides in [
            LaunchOverrides {
                vcpus: Some(0),
                ..Default::default()
            },
            LaunchOverrides {
                vcpus: Some(4),
                max_vcpus: Some(2),
                ..Default::default()
            },
            LaunchOverrides {
                memory_mib: Some(0),
                ..Default::default()
            },
            LaunchOverrides {
                memory_mib: Some(128),
                balloon_mib: Some(256),
                ..Default::default()
            },
        ] {
            let err = build_launch_spec(&f.kernel, &f.rootfs, &overrides, &f.socket).unwrap_err();
            assert!(matches!(err, VmliteError::Config(_)), "{:?}", overrides);
        }
    }

    #[test]
    fn test_console_mode_parse() {
        assert_eq!("off".parse::<ConsoleMode>().unwrap(), ConsoleMode::Off);
        assert_eq!(
            "file=/tmp/serial.log".parse::<ConsoleMode>().unwrap(),
            ConsoleMode::File(PathBuf::from("/tmp/serial.log"))
        );
        assert!("file=".parse::<ConsoleMode>().is_err());
        assert!("socket".parse::<ConsoleMode>().is_err());
        assert_eq!(ConsoleMode::Pty.to_string(), "pty");
    }

    #[test]
    fn test_merge_prefers_later_values() {
        let base = LaunchOverrides {
            vcpus: Some(2),
            memory_mib: Some(256),
            ..Default::default()
        };
        let merged = base.merge(LaunchOverrides {
            memory_mib: Some(1024),
            ..Default::default()
        });
        assert_eq!(merged.vcpus, Some(2));
        assert_eq!(merged.memory_mib, Some(1024));
    }

    #[test]
    fn test_render_script_quotes_cmdline() {
        let f = fixture();
        let spec =
            build_launch_spec(&f.kernel, &f.rootfs, &LaunchOverrides::default(), &f.socket)
                .unwrap();
        let script = spec.render_script("cloud-hypervisor");

        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("exec cloud-hypervisor"));
        assert!(script.contains("--cmdline 'console=ttyS0 reboot=k panic=1 rdinit=/init'"));
        assert!(script.contains("--cpus boot=2"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("size=256M"), "size=256M");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
