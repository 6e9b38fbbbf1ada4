mod cli;
mod commands;
mod logging;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _log_guard = match logging::init(&cli.global) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Provision(args) => commands::provision::execute(args, &cli.global).await,
        Commands::Run(args) => commands::run::execute(args, &cli.global).await,
        Commands::Ping => commands::control::ping(&cli.global).await,
        Commands::Pause => commands::control::pause(&cli.global).await,
        Commands::Resume => commands::control::resume(&cli.global).await,
        Commands::Reboot => commands::control::reboot(&cli.global).await,
        Commands::Shutdown => commands::control::shutdown(&cli.global).await,
        Commands::Info => commands::info::execute(&cli.global).await,
        Commands::Config(args) => commands::config::execute(args, &cli.global).await,
        Commands::Logs(args) => commands::logs::execute(args, &cli.global).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
