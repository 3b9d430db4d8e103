//! Command-line interface.

pub mod commands;
pub mod context;
pub mod id_resolver;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{
    approval::ApprovalArgs, conflict::ConflictArgs, hollon::HollonArgs, init::InitArgs, org::OrgArgs, role::RoleArgs,
    run::RunArgs, task::TaskArgs, team::TeamArgs, tick::TickArgs,
};

#[derive(Parser)]
#[command(name = "hollon")]
#[command(about = "Hollon - autonomous worker orchestration", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize configuration, database and a default organization
    Init(InitArgs),
    /// Organization management
    Org(OrgArgs),
    /// Team management
    Team(TeamArgs),
    /// Role management
    Role(RoleArgs),
    /// Hollon management
    Hollon(HollonArgs),
    /// Task pool management
    Task(TaskArgs),
    /// Conflict detection and resolution
    Conflict(ConflictArgs),
    /// Human approval requests
    Approval(ApprovalArgs),
    /// Run execution cycles until interrupted
    Run(RunArgs),
    /// Run a single dispatch round
    Tick(TickArgs),
}

/// Print `err` (as JSON in JSON mode) and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  Caused by: {cause}");
        }
    }
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_task_submit() {
        let cli = Cli::try_parse_from([
            "hollon", "task", "submit", "Build login", "--type", "epic", "--file", "src/auth.rs", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Task(args) = cli.command else {
            panic!("expected task command");
        };
        let commands::task::TaskCommands::Submit { title, task_type, files, .. } = args.command else {
            panic!("expected submit");
        };
        assert_eq!(title, "Build login");
        assert_eq!(task_type, "epic");
        assert_eq!(files, vec!["src/auth.rs".to_string()]);
    }
}
