//! Notification Classifier & Store

pub mod center;
pub mod classifier;
pub mod models;
pub mod storage;

pub use center::NotificationCenter;
pub use classifier::{classify_group, classify_priority};
pub use models::{Notification, NotificationGroup, NotificationPriority};
pub use storage::{JsonFileStorage, MemoryStorage, NotificationStorage, STORAGE_KEY};
