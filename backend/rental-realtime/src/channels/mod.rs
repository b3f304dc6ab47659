//! Identity-aware channel management on top of the connection multiplexer.

pub mod facades;
pub mod orchestrator;

pub use facades::{
    AcceptChatRequest, Channel, ChannelBinding, ChatChannel, EquipmentChannel, FeedbackChannel,
    InitiateChatRequest, NotificationChannel, ScheduleChannel, SendMessageRequest,
};
pub use orchestrator::{ChannelOrchestrator, ChannelReport};

use crate::error::RealtimeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::Staff => "Staff",
            Role::Customer => "Customer",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "staff" => Ok(Role::Staff),
            "customer" | "user" => Ok(Role::Customer),
            other => Err(RealtimeError::InvalidIdentity(format!("unknown role {other:?}"))),
        }
    }
}

/// Authenticated user the channels are opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: i64, role: Role) -> Result<Self, RealtimeError> {
        if user_id <= 0 {
            return Err(RealtimeError::InvalidIdentity(format!(
                "user id must be positive, got {user_id}"
            )));
        }
        Ok(Self { user_id, role })
    }

    /// Validate raw identity strings as handed over by the login flow.
    pub fn parse(user_id: Option<&str>, role: &str) -> Result<Self, RealtimeError> {
        let raw = user_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RealtimeError::InvalidIdentity("user id is missing".into()))?;
        let user_id = raw
            .parse::<i64>()
            .map_err(|_| RealtimeError::InvalidIdentity(format!("user id {raw:?} is not numeric")))?;

        Self::new(user_id, role.parse()?)
    }
}
