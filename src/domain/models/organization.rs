//! Organization and team topology.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    /// Maximum Brain spend per UTC day, in cents. `None` disables the budget gate.
    pub daily_cost_limit_cents: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            daily_cost_limit_cents: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_daily_cost_limit(mut self, cents: f64) -> Self {
        self.daily_cost_limit_cents = Some(cents);
        self
    }
}

/// A team of hollons with an optional leader and parent team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub leader_hollon_id: Option<Uuid>,
    pub parent_team_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn new(organization_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            leader_hollon_id: None,
            parent_team_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_leader(mut self, hollon_id: Uuid) -> Self {
        self.leader_hollon_id = Some(hollon_id);
        self
    }

    pub fn with_parent(mut self, team_id: Uuid) -> Self {
        self.parent_team_id = Some(team_id);
        self
    }
}
