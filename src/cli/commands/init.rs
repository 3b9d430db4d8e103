//! Implementation of the `hollon init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::fs;

use crate::adapters::sqlite::{
    database_url, initialize_database, SqliteHollonRepository, SqliteOrganizationRepository, SqliteRoleRepository,
};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, Hollon, Organization, Role, Team};
use crate::domain::ports::{HollonRepository, OrganizationRepository, RoleRepository};
use crate::infrastructure::config::CONFIG_DIR;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force reinitialization even if already initialized
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Name of the default organization
    #[arg(long, default_value = "default")]
    pub org: String,

    /// Name of the default team
    #[arg(long, default_value = "core")]
    pub team: String,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub initialized_path: PathBuf,
    pub organization_id: Option<String>,
    pub team_id: Option<String>,
    pub roles: Vec<String>,
    pub lead_hollon_id: Option<String>,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if let Some(org) = &self.organization_id {
            lines.push(format!("\nOrganization: {org}"));
        }
        if let Some(team) = &self.team_id {
            lines.push(format!("Team: {team}"));
        }
        if !self.roles.is_empty() {
            lines.push(format!("Roles: {}", self.roles.join(", ")));
        }
        if let Some(lead) = &self.lead_hollon_id {
            lines.push(format!("Lead hollon: {lead}"));
        }
        lines.join("\n")
    }
}

/// Roles seeded into a fresh organization: (name, capabilities, spawnable)
const DEFAULT_ROLES: [(&str, &[&str], bool); 3] = [
    ("lead", &["planning", "review", "coordination"], false),
    ("engineer", &["implementation", "bugfix", "testing", "refactoring"], true),
    ("reviewer", &["review", "code-review"], true),
];

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let target_path = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&args.path)
    };
    let hollon_dir = target_path.join(CONFIG_DIR);

    if hollon_dir.exists() && !args.force {
        let out = InitOutput {
            success: false,
            message: "Project already initialized. Use --force to reinitialize.".to_string(),
            initialized_path: target_path,
            organization_id: None,
            team_id: None,
            roles: vec![],
            lead_hollon_id: None,
        };
        output(&out, json_mode);
        return Ok(());
    }
    if args.force && hollon_dir.exists() {
        fs::remove_dir_all(&hollon_dir)
            .await
            .context("Failed to remove existing .hollon directory")?;
    }

    fs::create_dir_all(hollon_dir.join("logs"))
        .await
        .with_context(|| format!("Failed to create {}", hollon_dir.display()))?;

    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize default config")?;
    fs::write(hollon_dir.join("config.yaml"), yaml)
        .await
        .context("Failed to write config.yaml")?;

    let db_path = hollon_dir.join("hollon.db");
    let pool = initialize_database(&database_url(&db_path.display().to_string()), None)
        .await
        .context("Failed to initialize database")?;

    let orgs = SqliteOrganizationRepository::new(pool.clone());
    let roles = SqliteRoleRepository::new(pool.clone());
    let hollons = SqliteHollonRepository::new(pool);

    let org = Organization::new(&args.org);
    orgs.create_organization(&org).await?;

    let mut role_names = Vec::new();
    let mut lead_role = None;
    for (name, capabilities, spawnable) in DEFAULT_ROLES {
        let mut role = Role::new(org.id, name, capabilities.iter().map(ToString::to_string).collect());
        if spawnable {
            role = role.spawnable();
        }
        roles.create(&role).await?;
        role_names.push(name.to_string());
        if name == "lead" {
            lead_role = Some(role);
        }
    }
    let lead_role = lead_role.context("lead role missing from defaults")?;

    let mut team = Team::new(org.id, &args.team);
    orgs.create_team(&team).await?;
    let lead = Hollon::new(org.id, lead_role.id, format!("{}-lead", args.team)).with_team(team.id);
    hollons.create(&lead).await?;
    team.leader_hollon_id = Some(lead.id);
    orgs.update_team(&team).await?;

    tracing::info!(organization_id = %org.id, team_id = %team.id, "Project initialized");

    let out = InitOutput {
        success: true,
        message: if args.force {
            "Project reinitialized successfully.".to_string()
        } else {
            "Project initialized successfully.".to_string()
        },
        initialized_path: target_path,
        organization_id: Some(org.id.to_string()),
        team_id: Some(team.id.to_string()),
        roles: role_names,
        lead_hollon_id: Some(lead.id.to_string()),
    };
    output(&out, json_mode);
    Ok(())
}
