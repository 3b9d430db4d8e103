//! SQLite implementation of the CostRepository.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::format_datetime;
use crate::domain::errors::DomainResult;
use crate::domain::models::CostRecord;
use crate::domain::ports::CostRepository;

#[derive(Clone)]
pub struct SqliteCostRepository {
    pool: SqlitePool,
}

impl SqliteCostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CostRepository for SqliteCostRepository {
    async fn record(&self, record: &CostRecord) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO cost_records (id, organization_id, hollon_id, task_id, input_tokens, output_tokens,
               cost_cents, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.organization_id.to_string())
        .bind(record.hollon_id.map(|id| id.to_string()))
        .bind(record.task_id.map(|id| id.to_string()))
        .bind(record.input_tokens as i64)
        .bind(record.output_tokens as i64)
        .bind(record.cost_cents)
        .bind(format_datetime(record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn total_for_day(&self, organization_id: Uuid, day: DateTime<Utc>) -> DomainResult<f64> {
        let start = day.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let end = start + Duration::days(1);

        let (total,): (f64,) = sqlx::query_as(
            r"SELECT COALESCE(SUM(cost_cents), 0.0) FROM cost_records
               WHERE organization_id = ? AND created_at >= ? AND created_at < ?",
        )
        .bind(organization_id.to_string())
        .bind(format_datetime(start))
        .bind(format_datetime(end))
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteOrganizationRepository};
    use crate::domain::models::{BrainResponse, Organization};
    use crate::domain::ports::OrganizationRepository;

    #[tokio::test]
    async fn test_daily_total_excludes_other_days() {
        let pool = create_migrated_test_pool().await.unwrap();
        let org = Organization::new("acme");
        SqliteOrganizationRepository::new(pool.clone()).create_organization(&org).await.unwrap();
        let repo = SqliteCostRepository::new(pool);

        let mut response = BrainResponse::text("ok");
        response.cost_cents = 12.5;
        let today = CostRecord::from_response(org.id, Uuid::new_v4(), None, &response);
        let mut yesterday = CostRecord::from_response(org.id, Uuid::new_v4(), None, &response);
        yesterday.created_at -= Duration::days(1);

        repo.record(&today).await.unwrap();
        repo.record(&yesterday).await.unwrap();

        let total = repo.total_for_day(org.id, Utc::now()).await.unwrap();
        assert!((total - 12.5).abs() < f64::EPSILON);
        let other_org = repo.total_for_day(Uuid::new_v4(), Utc::now()).await.unwrap();
        assert!(other_org.abs() < f64::EPSILON);
    }
}
