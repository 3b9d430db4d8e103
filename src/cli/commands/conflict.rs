//! Conflict CLI commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;
use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, render_list, short_id, truncate, ActionOutput, CommandOutput};
use crate::domain::models::{Conflict, ConflictStatus};
use crate::services::{ConflictContext, ConflictDetectionResult};

#[derive(Args, Debug)]
pub struct ConflictArgs {
    #[command(subcommand)]
    pub command: ConflictCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConflictCommands {
    /// Detect and resolve conflicts around files, tags and tasks
    Detect {
        /// File to check for contention (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
        /// Resource tag to check for contention (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Task to include in priority and deadline checks (repeatable)
        #[arg(long = "task")]
        tasks: Vec<String>,
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
    },
    /// List conflicts
    List {
        /// Filter by status (detected, resolving, resolved, escalated)
        #[arg(short, long)]
        status: Option<String>,
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
    },
    /// Close a conflict by hand
    Resolve {
        /// Conflict ID or prefix
        id: String,
        /// Resolution notes
        #[arg(short, long)]
        notes: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct ConflictListOutput {
    pub conflicts: Vec<Conflict>,
    pub total: usize,
}

impl CommandOutput for ConflictListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "type", "status", "strategy", "tasks", "description"]);
        for conflict in &self.conflicts {
            table.add_row(vec![
                short_id(conflict.id),
                conflict.conflict_type.as_str().to_string(),
                conflict.status.as_str().to_string(),
                conflict
                    .resolution_strategy
                    .map_or_else(|| "-".to_string(), |s| s.as_str().to_string()),
                conflict.affected_task_ids.len().to_string(),
                truncate(&conflict.description, 48),
            ]);
        }
        render_list("conflict", &table, self.total)
    }
}

impl CommandOutput for ConflictDetectionResult {
    fn to_human(&self) -> String {
        if !self.has_conflicts {
            return "No conflicts detected.".to_string();
        }
        let mut lines = vec![format!("{} conflict(s) detected:", self.conflicts.len())];
        for conflict in &self.conflicts {
            lines.push(format!(
                "  {} {:<9} {:<10} {}",
                short_id(conflict.id),
                conflict.conflict_type.as_str(),
                conflict.status.as_str(),
                conflict.description
            ));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: ConflictArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let resolver = ctx.conflict_resolver();

    match args.command {
        ConflictCommands::Detect { files, tags, tasks, org } => {
            let org = ctx.organization(org.as_deref()).await?;
            let mut task_ids = Vec::with_capacity(tasks.len());
            for task in &tasks {
                task_ids.push(ctx.resolve(Entity::Task, task).await?);
            }
            let detection = resolver
                .detect_and_resolve(
                    &ConflictContext::new(org.id)
                        .with_files(files)
                        .with_tags(tags)
                        .with_task_ids(task_ids),
                )
                .await?;
            output(&detection, json_mode);
        }
        ConflictCommands::List { status, org } => {
            let org = ctx.organization(org.as_deref()).await?;
            let status = status
                .map(|s| ConflictStatus::from_str(&s).ok_or_else(|| anyhow!("Invalid status: {s}")))
                .transpose()?;
            let conflicts = resolver.list(org.id, status).await?;
            let total = conflicts.len();
            output(&ConflictListOutput { conflicts, total }, json_mode);
        }
        ConflictCommands::Resolve { id, notes } => {
            let conflict_id = ctx.resolve(Entity::Conflict, &id).await?;
            let conflict = resolver.manually_resolve(conflict_id, &notes).await?;
            output(
                &ActionOutput::ok(format!("Conflict {} resolved", short_id(conflict.id)), Some(conflict.id)),
                json_mode,
            );
        }
    }
    Ok(())
}
