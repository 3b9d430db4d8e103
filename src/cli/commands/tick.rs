//! `hollon tick`: a single dispatch round, or one cycle for one hollon.

use anyhow::Result;
use clap::Args;
use uuid::Uuid;

use crate::cli::context::CliContext;
use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, short_id, short_opt, CommandOutput};
use crate::services::{CycleOutcome, DispatchRound, HollonDispatcher};

#[derive(Args, Debug)]
pub struct TickArgs {
    /// Run one cycle for this hollon only
    #[arg(long)]
    pub hollon: Option<String>,

    /// Organization (ID, prefix or name)
    #[arg(long)]
    pub org: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct TickOutput {
    pub round: DispatchRound,
}

impl CommandOutput for TickOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "{} cycle(s), {} busy, {} error(s)",
            self.round.cycles(),
            self.round.busy(),
            self.round.errors.len()
        )];
        if self.round.expired_approvals > 0 {
            lines.push(format!("{} approval request(s) expired", self.round.expired_approvals));
        }
        let busy: Vec<&(Uuid, CycleOutcome)> = self
            .round
            .outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, CycleOutcome::NoTask | CycleOutcome::Paused))
            .collect();
        if !busy.is_empty() {
            let mut table = list_table(&["hollon", "outcome", "task"]);
            for (hollon_id, outcome) in busy {
                table.add_row(vec![short_id(*hollon_id), outcome.label().to_string(), short_opt(outcome.task_id())]);
            }
            lines.push(table.to_string());
        }
        for (hollon_id, error) in &self.round.errors {
            lines.push(format!("  {}: {error}", short_id(*hollon_id)));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: TickArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let orchestrator = ctx.orchestrator();

    let round = if let Some(hollon) = args.hollon {
        let hollon_id = ctx.resolve(Entity::Hollon, &hollon).await?;
        let mut round = DispatchRound::default();
        match orchestrator.run_cycle(hollon_id).await {
            Ok(outcome) => round.outcomes.push((hollon_id, outcome)),
            Err(e) => round.errors.push((hollon_id, e.to_string())),
        }
        round
    } else {
        let org = ctx.organization(args.org.as_deref()).await?;
        HollonDispatcher::new(orchestrator).run_round(org.id).await?
    };

    output(&TickOutput { round }, json_mode);
    Ok(())
}
