//! `hollon run`: dispatch execution cycles until interrupted.

use anyhow::Result;
use clap::Args;

use crate::cli::context::CliContext;
use crate::cli::output::{output, CommandOutput};
use crate::services::HollonDispatcher;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Organization (ID, prefix or name)
    #[arg(long)]
    pub org: Option<String>,

    /// Stop after this many rounds
    #[arg(long)]
    pub max_rounds: Option<u64>,
}

#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    pub organization: String,
    pub rounds: u64,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        format!("Dispatcher for '{}' stopped after {} round(s)", self.organization, self.rounds)
    }
}

pub async fn execute(args: RunArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let org = ctx.organization(args.org.as_deref()).await?;
    let dispatcher = HollonDispatcher::new(ctx.orchestrator());

    let rounds = dispatcher.run(org.id, args.max_rounds).await?;
    output(
        &RunOutput {
            organization: org.name,
            rounds,
        },
        json_mode,
    );
    Ok(())
}
