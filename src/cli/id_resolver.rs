//! Short ID prefix resolution for CLI arguments.
//!
//! Any unique prefix of a UUID is accepted, like git short hashes. Named
//! entities (organizations, teams, roles, hollons) also resolve by exact name.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::fmt::Write as _;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Organization,
    Team,
    Role,
    Hollon,
    Task,
    Conflict,
    Approval,
}

impl Entity {
    fn label(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Team => "team",
            Self::Role => "role",
            Self::Hollon => "hollon",
            Self::Task => "task",
            Self::Conflict => "conflict",
            Self::Approval => "approval request",
        }
    }

    fn query(self) -> &'static str {
        match self {
            Self::Organization => "SELECT id FROM organizations WHERE id LIKE ? OR name = ?",
            Self::Team => "SELECT id FROM teams WHERE id LIKE ? OR name = ?",
            Self::Role => "SELECT id FROM roles WHERE id LIKE ? OR name = ?",
            Self::Hollon => "SELECT id FROM hollons WHERE id LIKE ? OR name = ?",
            Self::Task => "SELECT id FROM tasks WHERE id LIKE ?",
            Self::Conflict => "SELECT id FROM conflicts WHERE id LIKE ?",
            Self::Approval => "SELECT id FROM approval_requests WHERE id LIKE ?",
        }
    }

    fn is_named(self) -> bool {
        matches!(self, Self::Organization | Self::Team | Self::Role | Self::Hollon)
    }
}

/// Resolve a full id, unique id prefix or (for named entities) name.
pub async fn resolve(pool: &SqlitePool, entity: Entity, input: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(input) {
        return Ok(uuid);
    }
    if input.is_empty() {
        bail!("{} reference must not be empty", entity.label());
    }

    let is_prefix = input.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    if !is_prefix && !entity.is_named() {
        bail!("Invalid ID prefix '{input}': must contain only hex characters and dashes");
    }

    // A name never matches the LIKE branch unless it is also hex
    let pattern = if is_prefix { format!("{input}%") } else { String::new() };
    let mut query = sqlx::query_as::<_, (String,)>(entity.query()).bind(pattern);
    if entity.is_named() {
        query = query.bind(input);
    }
    let rows = query.fetch_all(pool).await?;

    match rows.len() {
        0 => bail!("No {} found matching '{input}'", entity.label()),
        1 => Ok(Uuid::parse_str(&rows[0].0)?),
        n => {
            let mut msg = format!("Ambiguous reference '{input}': matches {n} {}s:", entity.label());
            for row in &rows {
                let _ = write!(msg, "\n  {}", row.0);
            }
            bail!("{msg}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteOrganizationRepository};
    use crate::domain::models::Organization;
    use crate::domain::ports::OrganizationRepository;

    #[tokio::test]
    async fn test_resolve_by_prefix_and_name() {
        let pool = create_migrated_test_pool().await.unwrap();
        let orgs = SqliteOrganizationRepository::new(pool.clone());
        let org = Organization::new("acme");
        orgs.create_organization(&org).await.unwrap();

        let full = org.id.to_string();
        assert_eq!(resolve(&pool, Entity::Organization, &full).await.unwrap(), org.id);
        assert_eq!(resolve(&pool, Entity::Organization, &full[..8]).await.unwrap(), org.id);
        assert_eq!(resolve(&pool, Entity::Organization, "acme").await.unwrap(), org.id);
        assert!(resolve(&pool, Entity::Organization, "globex").await.is_err());
        assert!(resolve(&pool, Entity::Task, "not-hex!").await.is_err());
    }
}
