use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vmlite::vmm::{ConsoleMode, DiskSpec};
use vmlite::{ControllerOptions, LaunchOverrides, VmController, VmliteConfig, WorkDirLayout};

use crate::commands::{config, logs, provision, run};

#[derive(Parser, Debug)]
#[command(
    name = "vmlite",
    version,
    about = "Provision and control a cloud-hypervisor microVM"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the kernel, build the rootfs and write the launch script
    Provision(provision::ProvisionArgs),
    /// Provision and boot the VM
    Run(run::RunArgs),
    /// Check that the VMM answers
    Ping,
    /// Pause the guest
    Pause,
    /// Resume a paused guest
    Resume,
    /// Reboot the guest
    Reboot,
    /// Shut down the guest and the VMM
    Shutdown,
    /// Print the VMM's view of the VM as JSON
    Info,
    /// Manage the configuration file
    Config(config::ConfigArgs),
    /// Print the VMM output log
    Logs(logs::LogsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Working directory for artifacts, sockets and logs [default: ~/.vmlite]
    #[arg(long, global = true, env = "VMLITE_HOME")]
    pub workdir: Option<PathBuf>,

    /// Configuration file [default: <workdir>/vmlite.json]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalFlags {
    pub fn layout(&self) -> anyhow::Result<WorkDirLayout> {
        Ok(WorkDirLayout::resolve(self.workdir.as_deref())?)
    }

    pub fn config_path(&self, layout: &WorkDirLayout) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| layout.config_path())
    }

    pub fn load_config(&self, layout: &WorkDirLayout) -> anyhow::Result<VmliteConfig> {
        Ok(VmliteConfig::load(&self.config_path(layout))?)
    }

    /// Controller for the VM whose API socket lives in the working directory.
    pub async fn attach(&self) -> anyhow::Result<VmController> {
        let layout = self.layout()?;
        let config = self.load_config(&layout)?;
        let options = ControllerOptions::from_settings(&config.vmm, None);
        Ok(VmController::attach(&layout.api_socket_path(), options).await?)
    }
}

/// VM shape flags shared by `provision`, `run` and `config set`.
#[derive(Args, Debug, Clone, Default)]
pub struct VmFlags {
    /// Boot vCPUs
    #[arg(long)]
    pub vcpus: Option<u8>,

    /// Hotplug ceiling for vCPUs
    #[arg(long)]
    pub max_vcpus: Option<u8>,

    /// Guest memory in MiB
    #[arg(long = "memory")]
    pub memory_mib: Option<u64>,

    /// Kernel command line
    #[arg(long, allow_hyphen_values = true)]
    pub cmdline: Option<String>,

    /// Serial port: off, null, tty, pty or file=<path>
    #[arg(long)]
    pub serial: Option<ConsoleMode>,

    /// Virtio console: off, null, tty, pty or file=<path>
    #[arg(long)]
    pub console: Option<ConsoleMode>,

    /// Attach a disk image (repeatable)
    #[arg(long = "disk", value_name = "PATH")]
    pub disks: Vec<PathBuf>,

    /// Balloon size in MiB
    #[arg(long = "balloon")]
    pub balloon_mib: Option<u64>,
}

impl VmFlags {
    pub fn to_overrides(&self) -> LaunchOverrides {
        LaunchOverrides {
            vcpus: self.vcpus,
            max_vcpus: self.max_vcpus,
            memory_mib: self.memory_mib,
            cmdline: self.cmdline.clone(),
            serial: self.serial.clone(),
            console: self.console.clone(),
            disks: self
                .disks
                .iter()
                .map(|path| DiskSpec {
                    path: path.clone(),
                    readonly: false,
                    size_mib: None,
                })
                .collect(),
            balloon_mib: self.balloon_mib,
            ..Default::default()
        }
    }
}
