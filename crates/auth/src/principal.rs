use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gatehouse_core::UserId;

/// Who is performing an operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Actor {
    /// The process itself (bootstrap, seeding, maintenance).
    System,
    /// An authenticated administrator account.
    User(UserId),
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Actor::System => f.write_str("system"),
            Actor::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Explicit per-call context.
///
/// Every administrative operation receives one of these instead of reading a
/// process-wide "current user". The correlation id ties together the log lines
/// of a single call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    actor: Actor,
    correlation_id: Uuid,
}

impl CallerContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            correlation_id: Uuid::now_v7(),
        }
    }

    pub fn system() -> Self {
        Self::new(Actor::System)
    }

    pub fn user(user_id: UserId) -> Self {
        Self::new(Actor::User(user_id))
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
