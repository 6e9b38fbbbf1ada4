//! Single-operation commands against a running VM.

use crate::cli::GlobalFlags;

pub async fn ping(global: &GlobalFlags) -> anyhow::Result<()> {
    let vm = global.attach().await?;
    let ping = vm.ping().await?;
    match ping.pid {
        Some(pid) => println!("{} (pid {})", ping.version, pid),
        None => println!("{}", ping.version),
    }
    Ok(())
}

pub async fn pause(global: &GlobalFlags) -> anyhow::Result<()> {
    let vm = global.attach().await?;
    vm.pause().await?;
    println!("{}", vm.status().await);
    Ok(())
}

pub async fn resume(global: &GlobalFlags) -> anyhow::Result<()> {
    let vm = global.attach().await?;
    vm.resume().await?;
    println!("{}", vm.status().await);
    Ok(())
}

pub async fn reboot(global: &GlobalFlags) -> anyhow::Result<()> {
    let vm = global.attach().await?;
    vm.reboot().await?;
    println!("rebooting");
    Ok(())
}

/// A VM that is not running counts as already shut down.
pub async fn shutdown(global: &GlobalFlags) -> anyhow::Result<()> {
    let vm = match global.attach().await {
        Ok(vm) => vm,
        Err(e) if is_not_running(&e) => {
            println!("{}", vmlite::VmStatus::Stopped);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    vm.shutdown().await?;
    println!("{}", vm.status().await);
    Ok(())
}

fn is_not_running(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<vmlite::VmliteError>(),
        Some(vmlite::VmliteError::NotRunning(_))
    )
}
