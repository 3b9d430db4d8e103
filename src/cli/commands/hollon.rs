//! Hollon CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;
use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, render_list, short_id, short_opt, ActionOutput, CommandOutput};
use crate::domain::models::{Hollon, HollonStatus};

#[derive(Args, Debug)]
pub struct HollonArgs {
    #[command(subcommand)]
    pub command: HollonCommands,
}

#[derive(Subcommand, Debug)]
pub enum HollonCommands {
    /// Create a permanent hollon
    Create {
        /// Hollon name
        name: String,
        /// Role (ID, prefix or name)
        #[arg(short, long)]
        role: String,
        /// Team (ID, prefix or name)
        #[arg(short, long)]
        team: Option<String>,
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
    },
    /// List hollons
    List {
        /// Only hollons in this team
        #[arg(short, long)]
        team: Option<String>,
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
    },
    /// Stop a hollon from taking part in execution cycles
    Pause {
        /// Hollon (ID, prefix or name)
        hollon: String,
    },
    /// Return a paused hollon to the idle pool
    Resume {
        /// Hollon (ID, prefix or name)
        hollon: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct HollonListOutput {
    pub hollons: Vec<Hollon>,
    pub total: usize,
}

impl CommandOutput for HollonListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "status", "lifecycle", "depth", "team", "parent"]);
        for hollon in &self.hollons {
            table.add_row(vec![
                short_id(hollon.id),
                hollon.name.clone(),
                hollon.status.to_string(),
                hollon.lifecycle.as_str().to_string(),
                hollon.depth.to_string(),
                short_opt(hollon.team_id),
                short_opt(hollon.parent_hollon_id),
            ]);
        }
        render_list("hollon", &table, self.total)
    }
}

pub async fn execute(args: HollonArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        HollonCommands::Create { name, role, team, org } => {
            let org = ctx.organization(org.as_deref()).await?;
            let role_id = ctx.resolve(Entity::Role, &role).await?;
            let mut hollon = Hollon::new(org.id, role_id, &name);
            if let Some(team) = team {
                hollon = hollon.with_team(ctx.resolve(Entity::Team, &team).await?);
            }
            ctx.ports.hollons.create(&hollon).await.context("Failed to create hollon")?;
            output(&ActionOutput::ok(format!("Hollon '{name}' created"), Some(hollon.id)), json_mode);
        }
        HollonCommands::List { team, org } => {
            let hollons = match team {
                Some(team) => {
                    let team_id = ctx.resolve(Entity::Team, &team).await?;
                    ctx.ports.hollons.list_by_team(team_id).await?
                }
                None => {
                    let org = ctx.organization(org.as_deref()).await?;
                    ctx.ports.hollons.list_by_organization(org.id).await?
                }
            };
            let total = hollons.len();
            output(&HollonListOutput { hollons, total }, json_mode);
        }
        HollonCommands::Pause { hollon } => {
            set_status(&ctx, &hollon, HollonStatus::Paused, json_mode).await?;
        }
        HollonCommands::Resume { hollon } => {
            set_status(&ctx, &hollon, HollonStatus::Idle, json_mode).await?;
        }
    }
    Ok(())
}

async fn set_status(ctx: &CliContext, reference: &str, status: HollonStatus, json_mode: bool) -> Result<()> {
    let id = ctx.resolve(Entity::Hollon, reference).await?;
    ctx.ports.hollons.update_status(id, status).await?;
    output(&ActionOutput::ok(format!("Hollon {} is now {status}", short_id(id)), Some(id)), json_mode);
    Ok(())
}
