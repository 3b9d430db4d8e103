//! Role model: a capability set plus a spawn-availability flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: String,
    /// Capability tags matched against task tags by the task pool
    pub capabilities: Vec<String>,
    /// Whether temporary hollons may be created with this role
    pub available_for_spawn: bool,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(organization_id: Uuid, name: impl Into<String>, capabilities: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            description: String::new(),
            capabilities,
            available_for_spawn: false,
            created_at: Utc::now(),
        }
    }

    pub fn spawnable(mut self) -> Self {
        self.available_for_spawn = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(capability))
    }

    /// Roles able to perform code review.
    pub fn can_review(&self) -> bool {
        self.has_capability("review") || self.has_capability("code-review")
    }
}
