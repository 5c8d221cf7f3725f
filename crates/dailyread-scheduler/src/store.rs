//! Schedule descriptor persistence.
//! The descriptor lives under one fixed key in a local key/value store and is
//! always written as a whole record.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dailyread_core::error::{DailyReadError, Result};
use serde::{Deserialize, Serialize};

use crate::daily::TimeOfDay;

/// Key of the single schedule record.
pub const SCHEDULE_KEY: &str = "notificationSchedule";

/// Current descriptor schema version.
pub const DESCRIPTOR_VERSION: u32 = 1;

fn default_version() -> u32 {
    DESCRIPTOR_VERSION
}

/// The persisted daily schedule. One per installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDescriptor {
    #[serde(default = "default_version")]
    pub version: u32,
    pub time_of_day: TimeOfDay,
    pub message: String,
    pub enabled: bool,
    pub next_fire_at: DateTime<Utc>,
}

impl ScheduleDescriptor {
    pub fn new(time_of_day: TimeOfDay, message: &str, next_fire_at: DateTime<Utc>) -> Self {
        Self {
            version: DESCRIPTOR_VERSION,
            time_of_day,
            message: message.to_string(),
            enabled: true,
            next_fire_at,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored record. Records from a newer schema are treated as absent.
    pub fn decode(raw: &str) -> Result<Option<Self>> {
        let descriptor: Self = serde_json::from_str(raw)?;
        if descriptor.version > DESCRIPTOR_VERSION {
            tracing::warn!(
                "⚠️ Ignoring schedule record with schema version {} (supported: {})",
                descriptor.version,
                DESCRIPTOR_VERSION
            );
            return Ok(None);
        }
        Ok(Some(descriptor))
    }
}

/// Backing store for the schedule record.
pub trait ScheduleStore: Send + Sync {
    fn load(&self) -> Result<Option<ScheduleDescriptor>>;
    fn save(&self, descriptor: &ScheduleDescriptor) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// JSON file holding a key/value map. Human-readable and survives restarts.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store at `<dir>/store.json`.
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self {
            path: dir.join("store.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        if !self.path.exists() {
            return Ok(serde_json::Map::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }
        serde_json::from_str(&json).map_err(|e| {
            DailyReadError::Storage(format!("Failed to parse {}: {e}", self.path.display()))
        })
    }

    fn write_map(&self, map: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(map)?;
        // Replace via rename so a reader never sees a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("💾 Saved schedule store to {}", self.path.display());
        Ok(())
    }
}

impl ScheduleStore for JsonFileStore {
    fn load(&self) -> Result<Option<ScheduleDescriptor>> {
        let map = self.read_map()?;
        match map.get(SCHEDULE_KEY) {
            Some(value) => ScheduleDescriptor::decode(&value.to_string()),
            None => Ok(None),
        }
    }

    fn save(&self, descriptor: &ScheduleDescriptor) -> Result<()> {
        let mut map = self.read_map()?;
        map.insert(SCHEDULE_KEY.to_string(), serde_json::to_value(descriptor)?);
        self.write_map(&map)
    }

    fn clear(&self) -> Result<()> {
        let mut map = self.read_map()?;
        if map.remove(SCHEDULE_KEY).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// In-memory store holding the encoded record.
#[derive(Default)]
pub struct MemoryStore {
    raw: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with an encoded record, as if left by an earlier process.
    pub fn with_raw(raw: &str) -> Self {
        Self {
            raw: Mutex::new(Some(raw.to_string())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock().ok().and_then(|g| g.clone())
    }
}

impl ScheduleStore for MemoryStore {
    fn load(&self) -> Result<Option<ScheduleDescriptor>> {
        match self.raw() {
            Some(raw) => ScheduleDescriptor::decode(&raw),
            None => Ok(None),
        }
    }

    fn save(&self, descriptor: &ScheduleDescriptor) -> Result<()> {
        let encoded = descriptor.encode()?;
        let mut guard = self
            .raw
            .lock()
            .map_err(|_| DailyReadError::Storage("memory store poisoned".into()))?;
        *guard = Some(encoded);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .raw
            .lock()
            .map_err(|_| DailyReadError::Storage("memory store poisoned".into()))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::utc;

    fn sample() -> ScheduleDescriptor {
        ScheduleDescriptor::new("20:00".parse().unwrap(), "Read now", utc("2024-01-02T20:00:00Z"))
    }

    #[test]
    fn test_wire_format_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["timeOfDay"], "20:00");
        assert_eq!(value["message"], "Read now");
        assert_eq!(value["enabled"], true);
        assert_eq!(value["version"], 1);
        assert!(value["nextFireAt"].as_str().unwrap().starts_with("2024-01-02T20:00:00"));
    }

    #[test]
    fn test_legacy_record_without_version() {
        let raw = serde_json::json!({
            "timeOfDay": "07:30",
            "message": "m",
            "enabled": true,
            "nextFireAt": "2024-01-02T07:30:00Z",
        })
        .to_string();
        let descriptor = ScheduleDescriptor::decode(&raw).unwrap().unwrap();
        assert_eq!(descriptor.version, 1);
        assert_eq!(descriptor.time_of_day.to_string(), "07:30");
    }

    #[test]
    fn test_newer_schema_is_ignored() {
        let raw = serde_json::json!({
            "version": 9,
            "timeOfDay": "07:30",
            "message": "m",
            "enabled": true,
            "nextFireAt": "2024-01-02T07:30:00Z",
        })
        .to_string();
        assert!(ScheduleDescriptor::decode(&raw).unwrap().is_none());
    }

    #[test]
    fn test_json_store_save_load_clear() {
        let dir = std::env::temp_dir().join("dailyread-test-json-store");
        std::fs::remove_dir_all(&dir).ok();
        let store = JsonFileStore::new(&dir);
        assert!(store.load().unwrap().is_none());

        store.save(&sample()).unwrap();
        let reopened = JsonFileStore::new(&dir);
        assert_eq!(reopened.load().unwrap(), Some(sample()));

        reopened.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        reopened.clear().unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_json_store_keeps_other_keys() {
        let dir = std::env::temp_dir().join("dailyread-test-json-store-keys");
        std::fs::remove_dir_all(&dir).ok();
        let store = JsonFileStore::new(&dir);
        std::fs::write(store.path(), r#"{"darkMode": true}"#).unwrap();

        store.save(&sample()).unwrap();
        store.clear().unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let map: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(map["darkMode"], true);
        assert!(map.get(SCHEDULE_KEY).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
