//! Roles recognized by the custody subsystem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role held by an identity. The mapping identity -> role is single-valued;
/// the last assignment wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Investigator,
    Admin,
    Auditor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Investigator => "investigator",
            Self::Admin => "admin",
            Self::Auditor => "auditor",
        }
    }

    pub fn all() -> [Role; 3] {
        [Self::Investigator, Self::Admin, Self::Auditor]
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "investigator" => Ok(Self::Investigator),
            "admin" => Ok(Self::Admin),
            "auditor" => Ok(Self::Auditor),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// Unknown role name.
#[derive(Debug, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);
