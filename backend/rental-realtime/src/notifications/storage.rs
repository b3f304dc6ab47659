/// Durable notification history
use super::models::Notification;
use crate::error::{RealtimeError, RealtimeResult};
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fixed key the history is stored under.
pub const STORAGE_KEY: &str = "rental.notifications";

pub trait NotificationStorage: Send + Sync {
    /// Stored history, most recent first. Empty when nothing was saved yet.
    fn load(&self) -> RealtimeResult<Vec<Notification>>;

    /// Replace the stored history.
    fn save(&self, notifications: &[Notification]) -> RealtimeResult<()>;
}

/// One JSON file per storage key, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{STORAGE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NotificationStorage for JsonFileStorage {
    fn load(&self) -> RealtimeResult<Vec<Notification>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&raw).map_err(|e| {
            RealtimeError::Storage(format!("{}: {}", self.path.display(), e))
        })
    }

    fn save(&self, notifications: &[Notification]) -> RealtimeResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(notifications)?)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), count = notifications.len(), "notification history saved");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifications(notifications: Vec<Notification>) -> Self {
        Self {
            notifications: Mutex::new(notifications),
        }
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

impl NotificationStorage for MemoryStorage {
    fn load(&self) -> RealtimeResult<Vec<Notification>> {
        Ok(self.snapshot())
    }

    fn save(&self, notifications: &[Notification]) -> RealtimeResult<()> {
        *self.notifications.lock() = notifications.to_vec();
        Ok(())
    }
}
