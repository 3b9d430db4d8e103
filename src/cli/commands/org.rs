//! Organization CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;
use crate::cli::output::{list_table, output, render_list, short_id, ActionOutput, CommandOutput};
use crate::domain::models::Organization;

#[derive(Args, Debug)]
pub struct OrgArgs {
    #[command(subcommand)]
    pub command: OrgCommands,
}

#[derive(Subcommand, Debug)]
pub enum OrgCommands {
    /// Create an organization
    Create {
        /// Organization name
        name: String,
        /// Daily Brain spend limit, in cents
        #[arg(long)]
        daily_cost_limit: Option<f64>,
    },
    /// List organizations
    List,
}

#[derive(Debug, serde::Serialize)]
pub struct OrgListOutput {
    pub organizations: Vec<Organization>,
    pub total: usize,
}

impl CommandOutput for OrgListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "daily limit", "created"]);
        for org in &self.organizations {
            table.add_row(vec![
                short_id(org.id),
                org.name.clone(),
                org.daily_cost_limit_cents
                    .map_or_else(|| "-".to_string(), |c| format!("{c:.0}c")),
                org.created_at.format("%Y-%m-%d").to_string(),
            ]);
        }
        render_list("organization", &table, self.total)
    }
}

pub async fn execute(args: OrgArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        OrgCommands::Create { name, daily_cost_limit } => {
            let mut org = Organization::new(&name);
            if let Some(limit) = daily_cost_limit {
                if limit < 0.0 {
                    anyhow::bail!("Daily cost limit must not be negative");
                }
                org = org.with_daily_cost_limit(limit);
            }
            ctx.ports
                .orgs
                .create_organization(&org)
                .await
                .context("Failed to create organization")?;
            output(&ActionOutput::ok(format!("Organization '{name}' created"), Some(org.id)), json_mode);
        }
        OrgCommands::List => {
            let organizations = ctx.ports.orgs.list_organizations().await?;
            let total = organizations.len();
            output(&OrgListOutput { organizations, total }, json_mode);
        }
    }
    Ok(())
}
