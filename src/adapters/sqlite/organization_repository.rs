//! SQLite repositories for organizations, teams and roles.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json_or_default, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Organization, Role, Team};
use crate::domain::ports::{OrganizationRepository, RoleRepository};

#[derive(Clone)]
pub struct SqliteOrganizationRepository {
    pool: SqlitePool,
}

impl SqliteOrganizationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationRepository for SqliteOrganizationRepository {
    async fn create_organization(&self, organization: &Organization) -> DomainResult<()> {
        sqlx::query("INSERT INTO organizations (id, name, daily_cost_limit_cents, created_at) VALUES (?, ?, ?, ?)")
            .bind(organization.id.to_string())
            .bind(&organization.name)
            .bind(organization.daily_cost_limit_cents)
            .bind(format_datetime(organization.created_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_organization(&self, id: Uuid) -> DomainResult<Option<Organization>> {
        let row: Option<OrganizationRow> = sqlx::query_as("SELECT * FROM organizations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_organizations(&self) -> DomainResult<Vec<Organization>> {
        let rows: Vec<OrganizationRow> = sqlx::query_as("SELECT * FROM organizations ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_team(&self, team: &Team) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO teams (id, organization_id, name, leader_hollon_id, parent_team_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(team.id.to_string())
        .bind(team.organization_id.to_string())
        .bind(&team.name)
        .bind(team.leader_hollon_id.map(|id| id.to_string()))
        .bind(team.parent_team_id.map(|id| id.to_string()))
        .bind(format_datetime(team.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_team(&self, team: &Team) -> DomainResult<()> {
        let result = sqlx::query("UPDATE teams SET name = ?, leader_hollon_id = ?, parent_team_id = ? WHERE id = ?")
            .bind(&team.name)
            .bind(team.leader_hollon_id.map(|id| id.to_string()))
            .bind(team.parent_team_id.map(|id| id.to_string()))
            .bind(team.id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TeamNotFound(team.id));
        }
        Ok(())
    }

    async fn get_team(&self, id: Uuid) -> DomainResult<Option<Team>> {
        let row: Option<TeamRow> = sqlx::query_as("SELECT * FROM teams WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_teams(&self, organization_id: Uuid) -> DomainResult<Vec<Team>> {
        let rows: Vec<TeamRow> = sqlx::query_as("SELECT * FROM teams WHERE organization_id = ? ORDER BY created_at")
            .bind(organization_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(Clone)]
pub struct SqliteRoleRepository {
    pool: SqlitePool,
}

impl SqliteRoleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRepository for SqliteRoleRepository {
    async fn create(&self, role: &Role) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO roles (id, organization_id, name, description, capabilities, available_for_spawn, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(role.id.to_string())
        .bind(role.organization_id.to_string())
        .bind(&role.name)
        .bind(&role.description)
        .bind(serde_json::to_string(&role.capabilities)?)
        .bind(role.available_for_spawn)
        .bind(format_datetime(role.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Role>> {
        let row: Option<RoleRow> = sqlx::query_as("SELECT * FROM roles WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_by_organization(&self, organization_id: Uuid) -> DomainResult<Vec<Role>> {
        let rows: Vec<RoleRow> = sqlx::query_as("SELECT * FROM roles WHERE organization_id = ? ORDER BY created_at")
            .bind(organization_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_spawnable(&self, organization_id: Uuid) -> DomainResult<Vec<Role>> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            "SELECT * FROM roles WHERE organization_id = ? AND available_for_spawn = 1 ORDER BY created_at",
        )
        .bind(organization_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct OrganizationRow {
    id: String,
    name: String,
    daily_cost_limit_cents: Option<f64>,
    created_at: String,
}

impl TryFrom<OrganizationRow> for Organization {
    type Error = DomainError;

    fn try_from(row: OrganizationRow) -> Result<Self, Self::Error> {
        Ok(Organization {
            id: parse_uuid(&row.id)?,
            name: row.name,
            daily_cost_limit_cents: row.daily_cost_limit_cents,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TeamRow {
    id: String,
    organization_id: String,
    name: String,
    leader_hollon_id: Option<String>,
    parent_team_id: Option<String>,
    created_at: String,
}

impl TryFrom<TeamRow> for Team {
    type Error = DomainError;

    fn try_from(row: TeamRow) -> Result<Self, Self::Error> {
        Ok(Team {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            name: row.name,
            leader_hollon_id: parse_optional_uuid(row.leader_hollon_id)?,
            parent_team_id: parse_optional_uuid(row.parent_team_id)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: String,
    organization_id: String,
    name: String,
    description: String,
    capabilities: Option<String>,
    available_for_spawn: bool,
    created_at: String,
}

impl TryFrom<RoleRow> for Role {
    type Error = DomainError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        Ok(Role {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            name: row.name,
            description: row.description,
            capabilities: parse_json_or_default(row.capabilities)?,
            available_for_spawn: row.available_for_spawn,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn test_teams_and_spawnable_roles() {
        let pool = create_migrated_test_pool().await.unwrap();
        let orgs = SqliteOrganizationRepository::new(pool.clone());
        let roles = SqliteRoleRepository::new(pool);

        let org = Organization::new("acme").with_daily_cost_limit(500.0);
        orgs.create_organization(&org).await.unwrap();
        assert_eq!(
            orgs.get_organization(org.id).await.unwrap().unwrap().daily_cost_limit_cents,
            Some(500.0)
        );

        let upper = Team::new(org.id, "platform");
        let lower = Team::new(org.id, "api").with_parent(upper.id);
        orgs.create_team(&upper).await.unwrap();
        orgs.create_team(&lower).await.unwrap();
        assert_eq!(orgs.get_team(lower.id).await.unwrap().unwrap().parent_team_id, Some(upper.id));
        assert_eq!(orgs.list_teams(org.id).await.unwrap().len(), 2);

        roles.create(&Role::new(org.id, "manager", vec!["planning".into()])).await.unwrap();
        roles
            .create(&Role::new(org.id, "dev", vec!["backend".into()]).spawnable())
            .await
            .unwrap();

        let spawnable = roles.list_spawnable(org.id).await.unwrap();
        assert_eq!(spawnable.len(), 1);
        assert_eq!(spawnable[0].name, "dev");
        assert!(spawnable[0].has_capability("BACKEND"));
    }
}
