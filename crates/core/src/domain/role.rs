use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Organisational roles known to the approval workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    FieldWorker,
    ProjectManager,
    HqManagement,
    Executive,
    Admin,
}

/// Seniority ranking, weakest first. Used only to compare roles, never to decide amounts.
pub const ROLE_HIERARCHY: [(Role, u8); 5] = [
    (Role::FieldWorker, 1),
    (Role::ProjectManager, 2),
    (Role::HqManagement, 3),
    (Role::Executive, 4),
    (Role::Admin, 5),
];

impl Role {
    pub const ALL: [Role; 5] =
        [Role::FieldWorker, Role::ProjectManager, Role::HqManagement, Role::Executive, Role::Admin];

    pub fn rank(self) -> u8 {
        ROLE_HIERARCHY
            .iter()
            .find(|(role, _)| *role == self)
            .map(|(_, rank)| *rank)
            .unwrap_or(0)
    }

    pub fn is_at_least(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FieldWorker => "field_worker",
            Self::ProjectManager => "project_manager",
            Self::HqManagement => "hq_management",
            Self::Executive => "executive",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "field_worker" => Ok(Self::FieldWorker),
            "project_manager" => Ok(Self::ProjectManager),
            "hq_management" => Ok(Self::HqManagement),
            "executive" => Ok(Self::Executive),
            "admin" => Ok(Self::Admin),
            other => Err(DomainError::UnknownRole(other.to_string())),
        }
    }
}
