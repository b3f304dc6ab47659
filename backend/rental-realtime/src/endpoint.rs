use crate::error::RealtimeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical push endpoints exposed by the rental backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endpoint {
    Chat,
    Equipment,
    EquipmentCondition,
    EquipmentStock,
    Feedback,
    Schedule,
    Notification,
}

impl Endpoint {
    pub const ALL: [Endpoint; 7] = [
        Endpoint::Chat,
        Endpoint::Equipment,
        Endpoint::EquipmentCondition,
        Endpoint::EquipmentStock,
        Endpoint::Feedback,
        Endpoint::Schedule,
        Endpoint::Notification,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Chat => "chat",
            Endpoint::Equipment => "equipment",
            Endpoint::EquipmentCondition => "equipment-condition",
            Endpoint::EquipmentStock => "equipment-stock",
            Endpoint::Feedback => "feedback",
            Endpoint::Schedule => "schedule",
            Endpoint::Notification => "notification",
        }
    }

    /// Path relative to the hub base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Chat => "/hubs/chat",
            Endpoint::Equipment => "/hubs/equipment",
            Endpoint::EquipmentCondition => "/hubs/equipment-condition",
            Endpoint::EquipmentStock => "/hubs/equipment-stock",
            Endpoint::Feedback => "/hubs/feedback",
            Endpoint::Schedule => "/hubs/schedule",
            Endpoint::Notification => "/hubs/notification",
        }
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endpoint {
    type Err = RealtimeError;

    /// Accepts `equipment-condition`, `equipment_condition` and `equipmentCondition`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(|c| c.to_lowercase())
            .collect();

        match normalized.as_str() {
            "chat" => Ok(Endpoint::Chat),
            "equipment" => Ok(Endpoint::Equipment),
            "equipmentcondition" => Ok(Endpoint::EquipmentCondition),
            "equipmentstock" => Ok(Endpoint::EquipmentStock),
            "feedback" => Ok(Endpoint::Feedback),
            "schedule" => Ok(Endpoint::Schedule),
            "notification" | "notifications" => Ok(Endpoint::Notification),
            _ => Err(RealtimeError::UnknownChannel(s.to_string())),
        }
    }
}
