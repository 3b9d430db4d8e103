//! SQLite implementation of the HollonRepository (worker registry).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Hollon, HollonStatus};
use crate::domain::ports::HollonRepository;

#[derive(Clone)]
pub struct SqliteHollonRepository {
    pool: SqlitePool,
}

impl SqliteHollonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HollonRepository for SqliteHollonRepository {
    async fn create(&self, hollon: &Hollon) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO hollons (id, name, organization_id, team_id, role_id, status, lifecycle,
               parent_hollon_id, depth, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(hollon.id.to_string())
        .bind(&hollon.name)
        .bind(hollon.organization_id.to_string())
        .bind(hollon.team_id.map(|id| id.to_string()))
        .bind(hollon.role_id.to_string())
        .bind(hollon.status.as_str())
        .bind(hollon.lifecycle.as_str())
        .bind(hollon.parent_hollon_id.map(|id| id.to_string()))
        .bind(i64::from(hollon.depth))
        .bind(format_datetime(hollon.created_at))
        .bind(format_datetime(hollon.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Hollon>> {
        let row: Option<HollonRow> = sqlx::query_as("SELECT * FROM hollons WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update_status(&self, id: Uuid, status: HollonStatus) -> DomainResult<()> {
        let result = sqlx::query("UPDATE hollons SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::HollonNotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM hollons WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::HollonNotFound(id));
        }
        Ok(())
    }

    async fn list_by_organization(&self, organization_id: Uuid) -> DomainResult<Vec<Hollon>> {
        let rows: Vec<HollonRow> =
            sqlx::query_as("SELECT * FROM hollons WHERE organization_id = ? ORDER BY depth, created_at")
                .bind(organization_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_team(&self, team_id: Uuid) -> DomainResult<Vec<Hollon>> {
        let rows: Vec<HollonRow> = sqlx::query_as("SELECT * FROM hollons WHERE team_id = ? ORDER BY created_at")
            .bind(team_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_temporary_children(&self, parent_id: Uuid) -> DomainResult<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM hollons WHERE parent_hollon_id = ? AND lifecycle = 'temporary'")
                .bind(parent_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    async fn count_temporary_in_organization(&self, organization_id: Uuid) -> DomainResult<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM hollons WHERE organization_id = ? AND lifecycle = 'temporary'")
                .bind(organization_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    async fn create_temporary_within_limits(
        &self,
        hollon: &Hollon,
        max_per_parent: u32,
        max_per_organization: u32,
    ) -> DomainResult<bool> {
        // A single statement holds the write lock across the counts and the insert
        let result = sqlx::query(
            r"INSERT INTO hollons (id, name, organization_id, team_id, role_id, status, lifecycle,
               parent_hollon_id, depth, created_at, updated_at)
               SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
               WHERE (SELECT COUNT(*) FROM hollons
                      WHERE parent_hollon_id = ? AND lifecycle = 'temporary') < ?
                 AND (SELECT COUNT(*) FROM hollons
                      WHERE organization_id = ? AND lifecycle = 'temporary') < ?",
        )
        .bind(hollon.id.to_string())
        .bind(&hollon.name)
        .bind(hollon.organization_id.to_string())
        .bind(hollon.team_id.map(|id| id.to_string()))
        .bind(hollon.role_id.to_string())
        .bind(hollon.status.as_str())
        .bind(hollon.lifecycle.as_str())
        .bind(hollon.parent_hollon_id.map(|id| id.to_string()))
        .bind(i64::from(hollon.depth))
        .bind(format_datetime(hollon.created_at))
        .bind(format_datetime(hollon.updated_at))
        .bind(hollon.parent_hollon_id.map(|id| id.to_string()))
        .bind(i64::from(max_per_parent))
        .bind(hollon.organization_id.to_string())
        .bind(i64::from(max_per_organization))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(sqlx::FromRow)]
struct HollonRow {
    id: String,
    name: String,
    organization_id: String,
    team_id: Option<String>,
    role_id: String,
    status: String,
    lifecycle: String,
    parent_hollon_id: Option<String>,
    depth: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<HollonRow> for Hollon {
    type Error = DomainError;

    fn try_from(row: HollonRow) -> Result<Self, Self::Error> {
        Ok(Hollon {
            id: parse_uuid(&row.id)?,
            name: row.name,
            organization_id: parse_uuid(&row.organization_id)?,
            team_id: parse_optional_uuid(row.team_id)?,
            role_id: parse_uuid(&row.role_id)?,
            status: row.status.parse()?,
            lifecycle: row.lifecycle.parse()?,
            parent_hollon_id: parse_optional_uuid(row.parent_hollon_id)?,
            depth: row.depth as u32,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
