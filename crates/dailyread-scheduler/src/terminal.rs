//! Notification surface for a terminal process.
//! Consent is asked once on stdin and recorded next to the schedule store.

use std::collections::BTreeMap;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dailyread_core::error::{DailyReadError, Result};
use serde::{Deserialize, Serialize};

use crate::notify::{Notification, NotificationPlatform, PermissionStatus};

#[derive(Debug, Serialize, Deserialize)]
struct PermissionRecord {
    permission: PermissionStatus,
    decided_at: DateTime<Utc>,
}

/// Printed when consent is undecided and stdin is not a terminal.
pub const NO_TERMINAL_NOTICE: &str = "Notification permission has not been decided yet and \
     there is no terminal to ask on. Run `dailyread test` from an interactive terminal to \
     answer the prompt.";

pub struct TerminalPlatform {
    permission_path: PathBuf,
    permission: Mutex<PermissionStatus>,
    displayed: Mutex<BTreeMap<String, Notification>>,
}

impl TerminalPlatform {
    /// Read the recorded decision at `permission_path`; missing means unset.
    pub fn new(permission_path: PathBuf) -> Self {
        let permission = read_record(&permission_path);
        Self {
            permission_path,
            permission: Mutex::new(permission),
            displayed: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn permission_path(&self) -> &Path {
        &self.permission_path
    }

    /// Store a decision, as the consent prompt does.
    pub fn record(&self, permission: PermissionStatus) -> Result<()> {
        let record = PermissionRecord {
            permission,
            decided_at: Utc::now(),
        };
        if let Some(parent) = self.permission_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.permission_path, serde_json::to_string_pretty(&record)?)?;
        let mut current = self
            .permission
            .lock()
            .map_err(|_| DailyReadError::Storage("permission state poisoned".into()))?;
        *current = permission;
        Ok(())
    }

    async fn ask(&self, interactive: bool) -> PermissionStatus {
        if !interactive {
            tracing::warn!("⚠️ No terminal to ask for notification permission");
            eprintln!("{NO_TERMINAL_NOTICE}");
            return PermissionStatus::Unset;
        }
        let answer = tokio::task::spawn_blocking(|| {
            print!("Allow daily reading reminders? [y/N] ");
            std::io::stdout().flush().ok();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        let decision = match answer {
            Ok(Ok(line)) => parse_answer(&line),
            Ok(Err(e)) => {
                tracing::warn!("⚠️ Failed to read answer: {e}");
                return PermissionStatus::Unset;
            }
            Err(e) => {
                tracing::warn!("⚠️ Permission prompt aborted: {e}");
                return PermissionStatus::Unset;
            }
        };
        if let Err(e) = self.record(decision) {
            tracing::warn!("⚠️ Failed to record permission decision: {e}");
        }
        decision
    }

    /// Notifications currently on screen, one per tag.
    pub fn displayed(&self) -> Vec<Notification> {
        self.displayed
            .lock()
            .map(|d| d.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn read_record(path: &Path) -> PermissionStatus {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return PermissionStatus::Unset;
    };
    match serde_json::from_str::<PermissionRecord>(&raw) {
        Ok(record) => record.permission,
        Err(e) => {
            tracing::warn!("⚠️ Ignoring unreadable permission file {}: {e}", path.display());
            PermissionStatus::Unset
        }
    }
}

fn parse_answer(line: &str) -> PermissionStatus {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => PermissionStatus::Granted,
        _ => PermissionStatus::Denied,
    }
}

#[async_trait]
impl NotificationPlatform for TerminalPlatform {
    fn name(&self) -> &str {
        "terminal"
    }

    fn supports_notifications(&self) -> bool {
        true
    }

    fn permission(&self) -> PermissionStatus {
        self.permission.lock().map(|p| *p).unwrap_or_default()
    }

    async fn prompt_permission(&self) -> PermissionStatus {
        self.ask(std::io::stdin().is_terminal()).await
    }

    fn show(&self, notification: &Notification) -> std::result::Result<(), String> {
        if self.permission() != PermissionStatus::Granted {
            return Err("notification permission not granted".into());
        }
        let mut displayed = self.displayed.lock().map_err(|_| "display poisoned".to_string())?;
        let replaced = displayed.insert(notification.tag.clone(), notification.clone()).is_some();

        let mut out = std::io::stdout().lock();
        writeln!(out, "🔔 {}", notification.title).map_err(|e| e.to_string())?;
        writeln!(out, "   {}", notification.body).map_err(|e| e.to_string())?;
        writeln!(out, "   → {}", notification.data.url).map_err(|e| e.to_string())?;
        if replaced {
            tracing::debug!("Replaced notification with tag {}", notification.tag);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationTemplate;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        std::fs::remove_dir_all(&dir).ok();
        dir.join("permission.json")
    }

    #[test]
    fn test_missing_file_is_unset() {
        let path = temp_path("dailyread-term-missing");
        let platform = TerminalPlatform::new(path);
        assert_eq!(platform.permission(), PermissionStatus::Unset);
        assert!(platform.supports_notifications());
    }

    #[test]
    fn test_recorded_decision_survives_restart() {
        let path = temp_path("dailyread-term-record");
        TerminalPlatform::new(path.clone())
            .record(PermissionStatus::Granted)
            .unwrap();
        assert_eq!(TerminalPlatform::new(path.clone()).permission(), PermissionStatus::Granted);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_corrupt_file_is_unset() {
        let path = temp_path("dailyread-term-corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "granted?").unwrap();
        assert_eq!(TerminalPlatform::new(path.clone()).permission(), PermissionStatus::Unset);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_no_terminal_leaves_decision_open() {
        let path = temp_path("dailyread-term-no-tty");
        let platform = TerminalPlatform::new(path.clone());
        assert_eq!(platform.ask(false).await, PermissionStatus::Unset);
        assert_eq!(platform.permission(), PermissionStatus::Unset);
        assert!(!path.exists());
        assert!(NO_TERMINAL_NOTICE.contains("no terminal"));
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), PermissionStatus::Granted);
        assert_eq!(parse_answer(" YES "), PermissionStatus::Granted);
        assert_eq!(parse_answer("n"), PermissionStatus::Denied);
        assert_eq!(parse_answer(""), PermissionStatus::Denied);
    }

    #[test]
    fn test_show_replaces_by_tag() {
        let path = temp_path("dailyread-term-show");
        let platform = TerminalPlatform::new(path.clone());
        let template = NotificationTemplate::default();
        assert!(platform.show(&template.render("x")).is_err());

        platform.record(PermissionStatus::Granted).unwrap();
        platform.show(&template.render("one")).unwrap();
        platform.show(&template.render("two")).unwrap();
        let displayed = platform.displayed();
        assert_eq!(displayed.len(), 1);
        assert_eq!(displayed[0].body, "two");
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
