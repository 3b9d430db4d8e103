//! Hollon (worker) domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::errors::DomainError;

/// Hollon status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HollonStatus {
    Idle,
    Working,
    Paused,
    /// Reserved for unrecoverable corruption; never set by the execution cycle
    Error,
}

impl HollonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for HollonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HollonStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "working" => Ok(Self::Working),
            "paused" => Ok(Self::Paused),
            "error" => Ok(Self::Error),
            _ => Err(DomainError::SerializationError(format!("Invalid hollon status: {s}"))),
        }
    }
}

/// Whether a hollon outlives the task it was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HollonLifecycle {
    Permanent,
    /// Exists for one delegated task or one review, then destroyed
    Temporary,
}

impl HollonLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Temporary => "temporary",
        }
    }
}

impl FromStr for HollonLifecycle {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "permanent" => Ok(Self::Permanent),
            "temporary" => Ok(Self::Temporary),
            _ => Err(DomainError::SerializationError(format!("Invalid hollon lifecycle: {s}"))),
        }
    }
}

/// An autonomous worker that pulls and performs tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hollon {
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    pub team_id: Option<Uuid>,
    pub role_id: Uuid,
    pub status: HollonStatus,
    pub lifecycle: HollonLifecycle,
    /// Spawning hollon for temporary workers
    pub parent_hollon_id: Option<Uuid>,
    pub depth: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hollon {
    /// Create a permanent, depth-0 hollon.
    pub fn new(organization_id: Uuid, role_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            organization_id,
            team_id: None,
            role_id,
            status: HollonStatus::Idle,
            lifecycle: HollonLifecycle::Permanent,
            parent_hollon_id: None,
            depth: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a temporary hollon spawned by `parent`, one level deeper.
    pub fn temporary(parent: &Hollon, role_id: Uuid, name: impl Into<String>) -> Self {
        let mut hollon = Self::new(parent.organization_id, role_id, name);
        hollon.team_id = parent.team_id;
        hollon.lifecycle = HollonLifecycle::Temporary;
        hollon.parent_hollon_id = Some(parent.id);
        hollon.depth = parent.depth + 1;
        hollon
    }

    pub fn with_team(mut self, team_id: Uuid) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn is_temporary(&self) -> bool {
        self.lifecycle == HollonLifecycle::Temporary
    }

    /// Only permanent, depth-0 hollons may spawn sub-hollons.
    pub fn can_spawn(&self) -> bool {
        self.lifecycle == HollonLifecycle::Permanent && self.depth == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_str() {
        assert_eq!("IDLE".parse::<HollonStatus>().unwrap(), HollonStatus::Idle);
        assert_eq!("paused".parse::<HollonStatus>().unwrap(), HollonStatus::Paused);
        assert!("sleeping".parse::<HollonStatus>().is_err());
    }

    #[test]
    fn test_temporary_inherits_parent() {
        let team = Uuid::new_v4();
        let parent = Hollon::new(Uuid::new_v4(), Uuid::new_v4(), "manager").with_team(team);
        let child = Hollon::temporary(&parent, Uuid::new_v4(), "worker-1");

        assert!(parent.can_spawn());
        assert!(child.is_temporary());
        assert!(!child.can_spawn());
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_hollon_id, Some(parent.id));
        assert_eq!(child.team_id, Some(team));
        assert_eq!(child.organization_id, parent.organization_id);
    }
}
