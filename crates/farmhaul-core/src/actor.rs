//! Marketplace actors.
//!
//! Actor format: `role:id`
//!
//! Supported roles:
//! - `transporter:T1` - Moves cargo; the only role that accepts and advances jobs
//! - `farmer:F1` - Lists produce; pickup counterparty
//! - `buyer:B1` - Receives produce; delivery counterparty

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role an actor plays in the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Transporter,
    Farmer,
    Buyer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Transporter => "transporter",
            Role::Farmer => "farmer",
            Role::Buyer => "buyer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ActorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transporter" => Ok(Role::Transporter),
            "farmer" => Ok(Role::Farmer),
            "buyer" => Ok(Role::Buyer),
            other => Err(ActorParseError::UnknownRole(other.to_string())),
        }
    }
}

/// An authenticated actor in the form `role:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Actor {
    role: Role,
    id: String,
}

impl Actor {
    /// Create a new actor.
    pub fn new(role: Role, id: impl Into<String>) -> Self {
        Self {
            role,
            id: id.into(),
        }
    }

    /// Create a transporter actor.
    pub fn transporter(id: impl Into<String>) -> Self {
        Self::new(Role::Transporter, id)
    }

    pub fn farmer(id: impl Into<String>) -> Self {
        Self::new(Role::Farmer, id)
    }

    pub fn buyer(id: impl Into<String>) -> Self {
        Self::new(Role::Buyer, id)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The server-side user id (what the API calls `actorId`).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Check if this actor may take and move delivery jobs.
    pub fn is_transporter(&self) -> bool {
        self.role == Role::Transporter
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}

impl FromStr for Actor {
    type Err = ActorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (role, id) = s
            .split_once(':')
            .ok_or_else(|| ActorParseError::MissingColon(s.to_string()))?;

        if id.is_empty() {
            return Err(ActorParseError::EmptyId);
        }

        Ok(Self {
            role: role.parse()?,
            id: id.to_string(),
        })
    }
}

impl TryFrom<String> for Actor {
    type Error = ActorParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Actor> for String {
    fn from(actor: Actor) -> Self {
        actor.to_string()
    }
}

/// Error parsing an actor string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorParseError {
    #[error("actor must contain ':' separator, got: {0}")]
    MissingColon(String),
    #[error("actor id cannot be empty")]
    EmptyId,
    #[error("unknown role: {0}")]
    UnknownRole(String),
}
