use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Notification group shown as a tab in the notification center
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationGroup {
    /// Equipment, stock, condition and maintenance events
    Equipment,
    /// Customer feedback and responses
    Feedback,
    /// Rentals, returns and pickups
    Rental,
    /// Replacement requests
    Replacement,
    /// Schedule and shift changes
    Schedule,
    /// Everything else, including locally raised errors
    System,
}

impl NotificationGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationGroup::Equipment => "equipment",
            NotificationGroup::Feedback => "feedback",
            NotificationGroup::Rental => "rental",
            NotificationGroup::Replacement => "replacement",
            NotificationGroup::Schedule => "schedule",
            NotificationGroup::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Medium => "medium",
            NotificationPriority::High => "high",
        }
    }
}

impl FromStr for NotificationPriority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(NotificationPriority::High),
            "medium" => Ok(NotificationPriority::Medium),
            "low" => Ok(NotificationPriority::Low),
            _ => Err(()),
        }
    }
}

/// Classified notification as kept by the notification center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(with = "timestamp::lenient")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    pub group: NotificationGroup,
    pub priority: NotificationPriority,
}
