use clap::{Args, Subcommand};
use vmlite::VmliteConfig;

use crate::cli::{GlobalFlags, VmFlags};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration as JSON
    Show,
    /// Update the VM section and save
    Set(VmFlags),
}

pub async fn execute(args: ConfigArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let layout = global.layout()?;
    let path = global.config_path(&layout);

    match args.command {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            VmliteConfig::default().save(&path)?;
            println!("{}", path.display());
        }
        ConfigCommand::Show => {
            let config = global.load_config(&layout)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::Set(flags) => {
            let mut config = global.load_config(&layout)?;
            config.update_vm(flags.to_overrides());
            config.save(&path)?;
            println!("{}", serde_json::to_string_pretty(&config.vm)?);
        }
    }
    Ok(())
}
