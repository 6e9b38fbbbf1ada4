use crate::cli::GlobalFlags;

pub async fn execute(global: &GlobalFlags) -> anyhow::Result<()> {
    let vm = global.attach().await?;
    let info = vm.get_info().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
