use clap::Args;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Only print the last N lines
    #[arg(short = 'n', long)]
    pub lines: Option<usize>,
}

pub async fn execute(args: LogsArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let path = global.layout()?.vmm_log_path();
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            anyhow::bail!("no VMM log at {} (has the VM been run?)", path.display())
        }
        Err(e) => return Err(anyhow::Error::new(e).context(format!("reading {}", path.display()))),
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = args
        .lines
        .map(|n| lines.len().saturating_sub(n))
        .unwrap_or(0);
    for line in &lines[start..] {
        println!("{}", line);
    }
    Ok(())
}
