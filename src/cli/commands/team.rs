//! Team CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;
use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, render_list, short_id, short_opt, ActionOutput, CommandOutput};
use crate::domain::models::Team;

#[derive(Args, Debug)]
pub struct TeamArgs {
    #[command(subcommand)]
    pub command: TeamCommands,
}

#[derive(Subcommand, Debug)]
pub enum TeamCommands {
    /// Create a team
    Create {
        /// Team name
        name: String,
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
        /// Parent team, for upper-team escalation
        #[arg(long)]
        parent: Option<String>,
        /// Leader hollon
        #[arg(long)]
        leader: Option<String>,
    },
    /// Set or change a team's leader
    SetLeader {
        /// Team (ID, prefix or name)
        team: String,
        /// Leader hollon
        leader: String,
    },
    /// List teams
    List {
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct TeamListOutput {
    pub teams: Vec<Team>,
    pub total: usize,
}

impl CommandOutput for TeamListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "leader", "parent"]);
        for team in &self.teams {
            table.add_row(vec![
                short_id(team.id),
                team.name.clone(),
                short_opt(team.leader_hollon_id),
                short_opt(team.parent_team_id),
            ]);
        }
        render_list("team", &table, self.total)
    }
}

pub async fn execute(args: TeamArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        TeamCommands::Create { name, org, parent, leader } => {
            let org = ctx.organization(org.as_deref()).await?;
            let mut team = Team::new(org.id, &name);
            if let Some(parent) = parent {
                team = team.with_parent(ctx.resolve(Entity::Team, &parent).await?);
            }
            if let Some(leader) = leader {
                team = team.with_leader(ctx.resolve(Entity::Hollon, &leader).await?);
            }
            ctx.ports.orgs.create_team(&team).await.context("Failed to create team")?;
            output(&ActionOutput::ok(format!("Team '{name}' created"), Some(team.id)), json_mode);
        }
        TeamCommands::SetLeader { team, leader } => {
            let team_id = ctx.resolve(Entity::Team, &team).await?;
            let leader_id = ctx.resolve(Entity::Hollon, &leader).await?;
            let mut team = ctx
                .ports
                .orgs
                .get_team(team_id)
                .await?
                .with_context(|| format!("Team {team_id} not found"))?;
            team.leader_hollon_id = Some(leader_id);
            ctx.ports.orgs.update_team(&team).await?;
            output(
                &ActionOutput::ok(format!("Team '{}' now led by {}", team.name, short_id(leader_id)), Some(team.id)),
                json_mode,
            );
        }
        TeamCommands::List { org } => {
            let org = ctx.organization(org.as_deref()).await?;
            let teams = ctx.ports.orgs.list_teams(org.id).await?;
            let total = teams.len();
            output(&TeamListOutput { teams, total }, json_mode);
        }
    }
    Ok(())
}
