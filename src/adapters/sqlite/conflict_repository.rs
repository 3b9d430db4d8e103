//! SQLite implementation of the ConflictRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json_or_default, parse_optional_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Conflict, ConflictStatus, ConflictType, ResolutionStrategy};
use crate::domain::ports::ConflictRepository;

#[derive(Clone)]
pub struct SqliteConflictRepository {
    pool: SqlitePool,
}

impl SqliteConflictRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConflictRepository for SqliteConflictRepository {
    async fn create(&self, conflict: &Conflict) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO conflicts (id, organization_id, conflict_type, status, affected_task_ids,
               affected_hollon_ids, description, resolution_strategy, resolved, resolution_notes,
               approval_request_id, created_at, resolved_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(conflict.id.to_string())
        .bind(conflict.organization_id.to_string())
        .bind(conflict.conflict_type.as_str())
        .bind(conflict.status.as_str())
        .bind(serde_json::to_string(&conflict.affected_task_ids)?)
        .bind(serde_json::to_string(&conflict.affected_hollon_ids)?)
        .bind(&conflict.description)
        .bind(conflict.resolution_strategy.map(|s| s.as_str()))
        .bind(conflict.resolved)
        .bind(&conflict.resolution_notes)
        .bind(conflict.approval_request_id.map(|id| id.to_string()))
        .bind(format_datetime(conflict.created_at))
        .bind(conflict.resolved_at.map(format_datetime))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Conflict>> {
        let row: Option<ConflictRow> = sqlx::query_as("SELECT * FROM conflicts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, conflict: &Conflict) -> DomainResult<()> {
        let result = sqlx::query(
            r"UPDATE conflicts SET status = ?, resolution_strategy = ?, resolved = ?, resolution_notes = ?,
               approval_request_id = ?, resolved_at = ?
               WHERE id = ?",
        )
        .bind(conflict.status.as_str())
        .bind(conflict.resolution_strategy.map(|s| s.as_str()))
        .bind(conflict.resolved)
        .bind(&conflict.resolution_notes)
        .bind(conflict.approval_request_id.map(|id| id.to_string()))
        .bind(conflict.resolved_at.map(format_datetime))
        .bind(conflict.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ConflictNotFound(conflict.id));
        }
        Ok(())
    }

    async fn list(&self, organization_id: Uuid, status: Option<ConflictStatus>) -> DomainResult<Vec<Conflict>> {
        let rows: Vec<ConflictRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    "SELECT * FROM conflicts WHERE organization_id = ? AND status = ? ORDER BY created_at DESC",
                )
                .bind(organization_id.to_string())
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM conflicts WHERE organization_id = ? ORDER BY created_at DESC")
                    .bind(organization_id.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ConflictRow {
    id: String,
    organization_id: String,
    conflict_type: String,
    status: String,
    affected_task_ids: Option<String>,
    affected_hollon_ids: Option<String>,
    description: String,
    resolution_strategy: Option<String>,
    resolved: bool,
    resolution_notes: Option<String>,
    approval_request_id: Option<String>,
    created_at: String,
    resolved_at: Option<String>,
}

impl TryFrom<ConflictRow> for Conflict {
    type Error = DomainError;

    fn try_from(row: ConflictRow) -> Result<Self, Self::Error> {
        let conflict_type = ConflictType::from_str(&row.conflict_type)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid conflict type: {}", row.conflict_type)))?;
        let status = ConflictStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid conflict status: {}", row.status)))?;
        let resolution_strategy = row
            .resolution_strategy
            .map(|s| {
                ResolutionStrategy::from_str(&s)
                    .ok_or_else(|| DomainError::SerializationError(format!("Invalid resolution strategy: {s}")))
            })
            .transpose()?;

        Ok(Conflict {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            conflict_type,
            status,
            affected_task_ids: parse_json_or_default(row.affected_task_ids)?,
            affected_hollon_ids: parse_json_or_default(row.affected_hollon_ids)?,
            description: row.description,
            resolution_strategy,
            resolved: row.resolved,
            resolution_notes: row.resolution_notes,
            approval_request_id: parse_optional_uuid(row.approval_request_id)?,
            created_at: parse_datetime(&row.created_at)?,
            resolved_at: parse_optional_datetime(row.resolved_at)?,
        })
    }
}
