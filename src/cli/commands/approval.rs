//! Approval request CLI commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;
use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, render_list, short_id, short_opt, truncate, ActionOutput, CommandOutput};
use crate::domain::models::{ApprovalRequest, ApprovalStatus};

#[derive(Args, Debug)]
pub struct ApprovalArgs {
    #[command(subcommand)]
    pub command: ApprovalCommands,
}

#[derive(Subcommand, Debug)]
pub enum ApprovalCommands {
    /// List approval requests
    List {
        /// Filter by status (pending, approved, rejected, expired)
        #[arg(short, long, default_value = "pending")]
        status: String,
        /// Include every status
        #[arg(long)]
        all: bool,
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
    },
    /// Show an approval request
    Show {
        /// Approval request ID or prefix
        id: String,
    },
    /// Approve a pending request
    Approve {
        /// Approval request ID or prefix
        id: String,
        /// Decision notes
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Reject a pending request
    Reject {
        /// Approval request ID or prefix
        id: String,
        /// Decision notes
        #[arg(short, long)]
        notes: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct ApprovalListOutput {
    pub requests: Vec<ApprovalRequest>,
    pub total: usize,
}

impl CommandOutput for ApprovalListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "type", "risk", "status", "task", "title"]);
        for request in &self.requests {
            table.add_row(vec![
                short_id(request.id),
                request.request_type.as_str().to_string(),
                request.risk_level.as_str().to_string(),
                request.status.as_str().to_string(),
                short_opt(request.task_id),
                truncate(&request.title, 48),
            ]);
        }
        render_list("approval request", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ApprovalDetailOutput {
    pub request: ApprovalRequest,
}

impl CommandOutput for ApprovalDetailOutput {
    fn to_human(&self) -> String {
        let r = &self.request;
        let mut lines = vec![
            format!("Approval request {}", r.id),
            format!("  Title:   {}", r.title),
            format!("  Type:    {}", r.request_type.as_str()),
            format!("  Risk:    {}", r.risk_level.as_str()),
            format!("  Status:  {}", r.status.as_str()),
            format!("  Task:    {}", short_opt(r.task_id)),
            format!("  Created: {}", r.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
        ];
        if let Some(expires) = r.expires_at {
            lines.push(format!("  Expires: {}", expires.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        if let Some(notes) = &r.resolution_notes {
            lines.push(format!("  Notes:   {notes}"));
        }
        lines.push(String::new());
        lines.push(r.reasoning.clone());
        lines.join("\n")
    }
}

pub async fn execute(args: ApprovalArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let approvals = ctx.approvals();

    match args.command {
        ApprovalCommands::List { status, all, org } => {
            let organization_id = match org {
                Some(org) => Some(ctx.organization(Some(&org)).await?.id),
                None => None,
            };
            let status = if all {
                None
            } else {
                Some(ApprovalStatus::from_str(&status).ok_or_else(|| anyhow!("Invalid status: {status}"))?)
            };
            approvals.expire_stale().await?;
            let requests = approvals.list(organization_id, status).await?;
            let total = requests.len();
            output(&ApprovalListOutput { requests, total }, json_mode);
        }
        ApprovalCommands::Show { id } => {
            let request = approvals.get(ctx.resolve(Entity::Approval, &id).await?).await?;
            output(&ApprovalDetailOutput { request }, json_mode);
        }
        ApprovalCommands::Approve { id, notes } => {
            let request = approvals
                .approve(ctx.resolve(Entity::Approval, &id).await?, notes.as_deref())
                .await?;
            output(
                &ActionOutput::ok(format!("Approval request {} approved", short_id(request.id)), Some(request.id)),
                json_mode,
            );
        }
        ApprovalCommands::Reject { id, notes } => {
            let request = approvals
                .reject(ctx.resolve(Entity::Approval, &id).await?, notes.as_deref())
                .await?;
            output(
                &ActionOutput::ok(format!("Approval request {} rejected", short_id(request.id)), Some(request.id)),
                json_mode,
            );
        }
    }
    Ok(())
}
