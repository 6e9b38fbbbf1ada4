use clap::Args;
use vmlite::Provisioner;

use crate::cli::{GlobalFlags, VmFlags};

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub vm: VmFlags,
}

pub async fn execute(args: ProvisionArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let layout = global.layout()?;
    let config = global.load_config(&layout)?;

    let provisioned = Provisioner::new(layout, config)
        .provision(args.vm.to_overrides())
        .await?;

    println!("kernel  {}", provisioned.kernel.path.display());
    println!("rootfs  {}", provisioned.rootfs.path.display());
    println!("script  {}", provisioned.script.display());
    Ok(())
}
