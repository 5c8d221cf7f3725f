//! Notification subsystem errors.

use dailyread_core::DailyReadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Notification or background-agent API is absent.
    #[error("Notifications are not supported on this platform")]
    UnsupportedPlatform,

    /// The user declined, now or earlier. Never re-prompted automatically.
    #[error("Notification permission denied")]
    PermissionDenied,

    #[error("Background agent registration failed: {0}")]
    Registration(String),

    /// Neither the agent nor the direct path could show the notification.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Invalid time of day '{0}' (expected HH:MM)")]
    InvalidTime(String),

    #[error("No daily reminder is scheduled")]
    NotScheduled,

    #[error(transparent)]
    Storage(#[from] DailyReadError),
}

impl NotifyError {
    /// Unsupported and denied both mean "notifications unavailable".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::UnsupportedPlatform | Self::PermissionDenied)
    }

    /// Copy shown to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedPlatform => {
                "This device or browser can't show notifications. Reminders are unavailable here."
                    .into()
            }
            Self::PermissionDenied => "Notifications are blocked. Allow them in your system or \
                 browser settings (Settings → Notifications → DailyRead, or the site \
                 permissions menu next to the address bar), then enable reminders again."
                .into(),
            Self::Registration(_) => {
                "Background reminders are unavailable; they will be shown while the app is open."
                    .into()
            }
            Self::Delivery(_) => "The reminder could not be shown. Please try again.".into(),
            Self::InvalidTime(raw) => {
                format!("'{raw}' is not a valid time. Use HH:MM, e.g. 09:00.")
            }
            Self::NotScheduled => "Turn on daily reminders first.".into(),
            Self::Storage(_) => "Reminder settings could not be saved.".into(),
        }
    }
}
