//! Role CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;
use crate::cli::output::{list_table, output, render_list, short_id, truncate, ActionOutput, CommandOutput};
use crate::domain::models::Role;

#[derive(Args, Debug)]
pub struct RoleArgs {
    #[command(subcommand)]
    pub command: RoleCommands,
}

#[derive(Subcommand, Debug)]
pub enum RoleCommands {
    /// Create a role
    Create {
        /// Role name
        name: String,
        /// Capability (repeatable)
        #[arg(short, long = "capability")]
        capabilities: Vec<String>,
        /// Allow temporary hollons to be spawned with this role
        #[arg(long)]
        spawnable: bool,
        /// Role description
        #[arg(short, long)]
        description: Option<String>,
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
    },
    /// List roles
    List {
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct RoleListOutput {
    pub roles: Vec<Role>,
    pub total: usize,
}

impl CommandOutput for RoleListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "spawnable", "capabilities"]);
        for role in &self.roles {
            table.add_row(vec![
                short_id(role.id),
                role.name.clone(),
                if role.available_for_spawn { "yes" } else { "no" }.to_string(),
                truncate(&role.capabilities.join(", "), 48),
            ]);
        }
        render_list("role", &table, self.total)
    }
}

pub async fn execute(args: RoleArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        RoleCommands::Create {
            name,
            capabilities,
            spawnable,
            description,
            org,
        } => {
            let org = ctx.organization(org.as_deref()).await?;
            let mut role = Role::new(org.id, &name, capabilities);
            if spawnable {
                role = role.spawnable();
            }
            if let Some(description) = description {
                role = role.with_description(description);
            }
            ctx.ports.roles.create(&role).await.context("Failed to create role")?;
            output(&ActionOutput::ok(format!("Role '{name}' created"), Some(role.id)), json_mode);
        }
        RoleCommands::List { org } => {
            let org = ctx.organization(org.as_deref()).await?;
            let roles = ctx.ports.roles.list_by_organization(org.id).await?;
            let total = roles.len();
            output(&RoleListOutput { roles, total }, json_mode);
        }
    }
    Ok(())
}
