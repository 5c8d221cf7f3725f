//! Notification model and the platform surface that renders it.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dailyread_core::config::NotificationsConfig;
use serde::{Deserialize, Serialize};

/// Platform notification consent. The platform owns it; we only read it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    #[default]
    Unset,
    Granted,
    Denied,
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unset => "unset",
            Self::Granted => "granted",
            Self::Denied => "denied",
        };
        f.write_str(s)
    }
}

/// Action id that dismisses without navigating.
pub const ACTION_CLOSE: &str = "close";
/// Action id that opens (or focuses) the app.
pub const ACTION_OPEN: &str = "open";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Route opened when the notification is activated.
    pub url: String,
    pub date_of_arrival: DateTime<Utc>,
}

/// A rendered notification, ready for the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// Same tag replaces the previous notification instead of stacking.
    pub tag: String,
    pub require_interaction: bool,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

/// Builds notifications from the configured look and feel.
#[derive(Debug, Clone)]
pub struct NotificationTemplate {
    config: NotificationsConfig,
}

impl NotificationTemplate {
    pub fn new(config: NotificationsConfig) -> Self {
        Self { config }
    }

    pub fn target_route(&self) -> &str {
        &self.config.target_route
    }

    pub fn tag(&self) -> &str {
        &self.config.tag
    }

    /// Render `message`; an empty message falls back to the default text.
    pub fn render(&self, message: &str) -> Notification {
        let body = if message.trim().is_empty() {
            self.config.default_message.clone()
        } else {
            message.to_string()
        };
        Notification {
            title: self.config.title.clone(),
            body,
            icon: self.config.icon.clone(),
            badge: self.config.icon.clone(),
            vibrate: self.config.vibrate.clone(),
            tag: self.config.tag.clone(),
            require_interaction: false,
            data: NotificationData {
                url: self.config.target_route.clone(),
                date_of_arrival: Utc::now(),
            },
            actions: vec![
                NotificationAction {
                    action: ACTION_OPEN.into(),
                    title: "Open app".into(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.into(),
                    title: "Close".into(),
                },
            ],
        }
    }
}

impl Default for NotificationTemplate {
    fn default() -> Self {
        Self::new(NotificationsConfig::default())
    }
}

/// The platform's notification API: consent plus direct rendering.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a notification-permission API exists at all.
    fn supports_notifications(&self) -> bool;

    fn permission(&self) -> PermissionStatus;

    /// Show the consent prompt and return the user's decision.
    async fn prompt_permission(&self) -> PermissionStatus;

    /// Render a notification from the calling context.
    fn show(&self, notification: &Notification) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_uses_config_and_actions() {
        let template = NotificationTemplate::default();
        let n = template.render("Read now");
        assert_eq!(n.body, "Read now");
        assert_eq!(n.tag, "daily-reading");
        assert_eq!(n.data.url, "/dashboard");
        assert!(!n.require_interaction);
        let ids: Vec<&str> = n.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(ids, vec![ACTION_OPEN, ACTION_CLOSE]);
    }

    #[test]
    fn test_render_empty_message_uses_default() {
        let template = NotificationTemplate::default();
        let n = template.render("  ");
        assert_eq!(n.body, NotificationsConfig::default().default_message);
    }

    #[test]
    fn test_permission_status_serde() {
        assert_eq!(serde_json::to_string(&PermissionStatus::Granted).unwrap(), "\"granted\"");
        let parsed: PermissionStatus = serde_json::from_str("\"denied\"").unwrap();
        assert_eq!(parsed, PermissionStatus::Denied);
    }
}
