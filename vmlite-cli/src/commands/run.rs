use clap::Args;
use vmlite::{Provisioner, VmStatus};

use crate::cli::{GlobalFlags, VmFlags};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Leave the VM running and return immediately
    #[arg(short, long)]
    pub detach: bool,

    #[command(flatten)]
    pub vm: VmFlags,
}

pub async fn execute(args: RunArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let layout = global.layout()?;
    let config = global.load_config(&layout)?;

    let (provisioned, vm) = Provisioner::new(layout.clone(), config)
        .launch(args.vm.to_overrides())
        .await?;
    let pid = vm.state().await.pid;

    println!("socket  {}", provisioned.spec.api_socket().display());
    if let Some(pid) = pid {
        println!("pid     {}", pid);
    }
    println!("log     {}", layout.vmm_log_path().display());

    if args.detach {
        return Ok(());
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Interrupted, shutting down VM");
            vm.shutdown().await?;
        }
        status = vm.wait_for_exit() => {
            if status != VmStatus::Stopped {
                anyhow::bail!("VM ended in unexpected state: {}", status);
            }
            tracing::info!("VMM exited");
        }
    }
    Ok(())
}
