//! Brain cost accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::brain::BrainResponse;

/// One Brain call's spend, attributed to an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub hollon_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_cents: f64,
    pub created_at: DateTime<Utc>,
}

impl CostRecord {
    pub fn from_response(
        organization_id: Uuid,
        hollon_id: Uuid,
        task_id: Option<Uuid>,
        response: &BrainResponse,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            hollon_id: Some(hollon_id),
            task_id,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            cost_cents: response.cost_cents,
            created_at: Utc::now(),
        }
    }
}
