//! SQLite implementation of the ApprovalRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ApprovalRequest, ApprovalRequestType, ApprovalStatus, RiskLevel};
use crate::domain::ports::ApprovalRepository;

#[derive(Clone)]
pub struct SqliteApprovalRepository {
    pool: SqlitePool,
}

impl SqliteApprovalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalRepository for SqliteApprovalRepository {
    async fn create(&self, request: &ApprovalRequest) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO approval_requests (id, organization_id, request_type, status, risk_level, title,
               reasoning, requested_by_hollon_id, task_id, conflict_id, resolution_notes, created_at,
               expires_at, resolved_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(request.id.to_string())
        .bind(request.organization_id.to_string())
        .bind(request.request_type.as_str())
        .bind(request.status.as_str())
        .bind(request.risk_level.as_str())
        .bind(&request.title)
        .bind(&request.reasoning)
        .bind(request.requested_by_hollon_id.map(|id| id.to_string()))
        .bind(request.task_id.map(|id| id.to_string()))
        .bind(request.conflict_id.map(|id| id.to_string()))
        .bind(&request.resolution_notes)
        .bind(format_datetime(request.created_at))
        .bind(request.expires_at.map(format_datetime))
        .bind(request.resolved_at.map(format_datetime))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ApprovalRequest>> {
        let row: Option<ApprovalRow> = sqlx::query_as("SELECT * FROM approval_requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, request: &ApprovalRequest) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE approval_requests SET status = ?, resolution_notes = ?, resolved_at = ? WHERE id = ?",
        )
        .bind(request.status.as_str())
        .bind(&request.resolution_notes)
        .bind(request.resolved_at.map(format_datetime))
        .bind(request.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ApprovalNotFound(request.id));
        }
        Ok(())
    }

    async fn list(
        &self,
        organization_id: Option<Uuid>,
        status: Option<ApprovalStatus>,
    ) -> DomainResult<Vec<ApprovalRequest>> {
        let mut query = String::from("SELECT * FROM approval_requests WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(org) = organization_id {
            query.push_str(" AND organization_id = ?");
            bindings.push(org.to_string());
        }
        if let Some(status) = status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        query.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query_as::<_, ApprovalRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let now = format_datetime(now);
        let result = sqlx::query(
            r"UPDATE approval_requests SET status = 'expired', resolved_at = ?
               WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct ApprovalRow {
    id: String,
    organization_id: String,
    request_type: String,
    status: String,
    risk_level: String,
    title: String,
    reasoning: String,
    requested_by_hollon_id: Option<String>,
    task_id: Option<String>,
    conflict_id: Option<String>,
    resolution_notes: Option<String>,
    created_at: String,
    expires_at: Option<String>,
    resolved_at: Option<String>,
}

impl TryFrom<ApprovalRow> for ApprovalRequest {
    type Error = DomainError;

    fn try_from(row: ApprovalRow) -> Result<Self, Self::Error> {
        let request_type = ApprovalRequestType::from_str(&row.request_type)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid request type: {}", row.request_type)))?;
        let status = ApprovalStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid approval status: {}", row.status)))?;
        let risk_level = RiskLevel::from_str(&row.risk_level)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid risk level: {}", row.risk_level)))?;

        Ok(ApprovalRequest {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            request_type,
            status,
            risk_level,
            title: row.title,
            reasoning: row.reasoning,
            requested_by_hollon_id: parse_optional_uuid(row.requested_by_hollon_id)?,
            task_id: parse_optional_uuid(row.task_id)?,
            conflict_id: parse_optional_uuid(row.conflict_id)?,
            resolution_notes: row.resolution_notes,
            created_at: parse_datetime(&row.created_at)?,
            expires_at: parse_optional_datetime(row.expires_at)?,
            resolved_at: parse_optional_datetime(row.resolved_at)?,
        })
    }
}
