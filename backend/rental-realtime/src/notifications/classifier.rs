/// Group and priority classification of inbound notification types
use super::models::{NotificationGroup, NotificationPriority};
use serde_json::Value;

/// Keyword table, checked in order; the first keyword found in the
/// lowercased type tag decides the group.
///
/// Order matters for compound tags: "EquipmentReplacementRequest" and
/// "EquipmentFeedback" also contain "equipment", so the replacement and
/// feedback keywords must come before every equipment keyword.
const GROUP_KEYWORDS: &[(&str, NotificationGroup)] = &[
    ("replacement", NotificationGroup::Replacement),
    ("feedback", NotificationGroup::Feedback),
    ("equipment", NotificationGroup::Equipment),
    ("stock", NotificationGroup::Equipment),
    ("condition", NotificationGroup::Equipment),
    ("maintenance", NotificationGroup::Equipment),
    ("inventory", NotificationGroup::Equipment),
    ("rental", NotificationGroup::Rental),
    ("return", NotificationGroup::Rental),
    ("pickup", NotificationGroup::Rental),
    ("schedule", NotificationGroup::Schedule),
    ("shift", NotificationGroup::Schedule),
];

const CRITICAL_TYPES: &[&str] = &["error", "outofstock", "emergency"];

const CRITICAL_MARKERS: &[&str] = &["critical", "urgent"];

const IMPORTANT_TYPES: &[&str] = &[
    "feedbackresponse",
    "newfeedback",
    "lowstock",
    "conditionalert",
    "maintenancedue",
    "rentaloverdue",
    "returndue",
    "replacementrequest",
    "schedulechange",
    "shiftchange",
    "warning",
];

pub fn classify_group(kind: &str) -> NotificationGroup {
    let kind = kind.to_ascii_lowercase();
    GROUP_KEYWORDS
        .iter()
        .find(|(keyword, _)| kind.contains(keyword))
        .map(|(_, group)| *group)
        .unwrap_or(NotificationGroup::System)
}

/// An explicit `payload.priority` of high/medium/low wins over the type tag.
pub fn classify_priority(kind: &str, payload: &Value) -> NotificationPriority {
    if let Some(explicit) = payload
        .get("priority")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
    {
        return explicit;
    }

    let kind = kind.to_ascii_lowercase();
    if CRITICAL_TYPES.contains(&kind.as_str())
        || CRITICAL_MARKERS.iter().any(|marker| kind.contains(marker))
    {
        NotificationPriority::High
    } else if IMPORTANT_TYPES.contains(&kind.as_str()) {
        NotificationPriority::Medium
    } else {
        NotificationPriority::Low
    }
}
