//! `vmlite-fake-vmm`: accepts cloud-hypervisor's command line and serves a
//! fake control API on `--api-socket`.
//!
//! Guest kernel command-line tokens steer failure modes:
//! - `fakevmm.mode=exit`: exit with status 1 before binding.
//! - `fakevmm.mode=nosocket`: stay alive without ever binding.

use std::path::PathBuf;

use clap::Parser;
use vmlite_test_utils::{FakeVmmHandle, serve_api};

#[derive(Parser, Debug)]
#[allow(dead_code)]
#[command(name = "vmlite-fake-vmm")]
struct Args {
    #[arg(long)]
    kernel: Option<PathBuf>,
    #[arg(long)]
    initramfs: Option<PathBuf>,
    #[arg(long, allow_hyphen_values = true)]
    cmdline: Option<String>,
    #[arg(long)]
    cpus: Option<String>,
    #[arg(long)]
    memory: Option<String>,
    #[arg(long)]
    serial: Option<String>,
    #[arg(long)]
    console: Option<String>,
    #[arg(long)]
    api_socket: PathBuf,
    #[arg(long)]
    disk: Vec<String>,
    #[arg(long)]
    net: Vec<String>,
    #[arg(long)]
    balloon: Option<String>,
    #[arg(long)]
    vsock: Option<String>,
}

/// `boot=N[,max=M]` → N.
fn boot_vcpus(cpus: Option<&str>) -> u8 {
    cpus.and_then(|v| v.split(',').find_map(|kv| kv.strip_prefix("boot=")))
        .and_then(|n| n.parse().ok())
        .unwrap_or(1)
}

/// `size=<N>M` → N.
fn memory_mib(memory: Option<&str>) -> u64 {
    memory
        .and_then(|v| v.split(',').find_map(|kv| kv.strip_prefix("size=")))
        .and_then(|s| s.trim_end_matches('M').parse().ok())
        .unwrap_or(512)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let mode = args
        .cmdline
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .find_map(|token| token.strip_prefix("fakevmm.mode="))
        .unwrap_or("serve")
        .to_string();

    println!("fake-vmm: mode={} args={:?}", mode, args);

    match mode.as_str() {
        "exit" => std::process::exit(1),
        "nosocket" => std::future::pending::<()>().await,
        _ => {}
    }

    let handle = FakeVmmHandle::new(Some(std::process::id()));
    handle.set_resources(boot_vcpus(args.cpus.as_deref()), memory_mib(args.memory.as_deref()));

    if let Err(e) = serve_api(args.api_socket.clone(), handle).await {
        eprintln!("fake-vmm: {}", e);
        std::process::exit(1);
    }
    println!("fake-vmm: shut down");
}
