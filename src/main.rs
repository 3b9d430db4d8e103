//! Hollon CLI entry point.

use clap::Parser;

use hollon::cli::{commands, handle_error, Cli, Commands};
use hollon::infrastructure::config::ConfigLoader;
use hollon::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Config errors are reported by the command itself; logging falls back to defaults.
    let log_config = ConfigLoader::load().map_or_else(|_| LogConfig::default(), |c| LogConfig::from(&c.logging));
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        }
    };

    let json = cli.json;
    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, json).await,
        Commands::Org(args) => commands::org::execute(args, json).await,
        Commands::Team(args) => commands::team::execute(args, json).await,
        Commands::Role(args) => commands::role::execute(args, json).await,
        Commands::Hollon(args) => commands::hollon::execute(args, json).await,
        Commands::Task(args) => commands::task::execute(args, json).await,
        Commands::Conflict(args) => commands::conflict::execute(args, json).await,
        Commands::Approval(args) => commands::approval::execute(args, json).await,
        Commands::Run(args) => commands::run::execute(args, json).await,
        Commands::Tick(args) => commands::tick::execute(args, json).await,
    };

    if let Err(err) = result {
        handle_error(err, json);
    }
}
