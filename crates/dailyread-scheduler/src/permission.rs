//! Permission gate — every read or request of notification consent goes here.

use std::sync::Arc;

use crate::agent::AgentHost;
use crate::error::NotifyError;
use crate::notify::{NotificationPlatform, PermissionStatus};

pub struct PermissionGate {
    platform: Arc<dyn NotificationPlatform>,
    agents: Arc<dyn AgentHost>,
    prompt_lock: tokio::sync::Mutex<()>,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn NotificationPlatform>, agents: Arc<dyn AgentHost>) -> Self {
        Self {
            platform,
            agents,
            prompt_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Both a permission API and a background-agent API are present.
    pub fn check_support(&self) -> bool {
        self.platform.supports_notifications() && self.agents.is_supported()
    }

    /// Platform's current decision. Unsupported platforms read as denied.
    pub fn current_status(&self) -> PermissionStatus {
        if !self.check_support() {
            return PermissionStatus::Denied;
        }
        self.platform.permission()
    }

    /// Prompt only when undecided; a denied platform is never re-prompted.
    pub async fn request_permission(&self) -> PermissionStatus {
        if !self.check_support() {
            tracing::info!("❌ Notifications not supported on {}", self.platform.name());
            return PermissionStatus::Denied;
        }
        // Concurrent requests share one prompt.
        let _guard = self.prompt_lock.lock().await;
        match self.platform.permission() {
            PermissionStatus::Granted => PermissionStatus::Granted,
            PermissionStatus::Denied => {
                tracing::info!("❌ Notification permission previously denied");
                PermissionStatus::Denied
            }
            PermissionStatus::Unset => {
                tracing::info!("🔔 Requesting notification permission...");
                let decision = self.platform.prompt_permission().await;
                tracing::info!("Permission result: {decision}");
                decision
            }
        }
    }

    /// Request if needed, mapping the outcome onto the error taxonomy.
    pub async fn ensure_granted(&self) -> Result<(), NotifyError> {
        if !self.check_support() {
            return Err(NotifyError::UnsupportedPlatform);
        }
        match self.request_permission().await {
            PermissionStatus::Granted => Ok(()),
            _ => Err(NotifyError::PermissionDenied),
        }
    }

    /// Check without prompting.
    pub fn require_granted(&self) -> Result<(), NotifyError> {
        if !self.check_support() {
            return Err(NotifyError::UnsupportedPlatform);
        }
        match self.platform.permission() {
            PermissionStatus::Granted => Ok(()),
            _ => Err(NotifyError::PermissionDenied),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAgentHost, RecordingPlatform};

    fn gate(platform: Arc<RecordingPlatform>) -> PermissionGate {
        PermissionGate::new(platform, Arc::new(FakeAgentHost::new()))
    }

    #[tokio::test]
    async fn test_granted_returns_without_prompt() {
        let platform = Arc::new(RecordingPlatform::granted());
        let gate = gate(platform.clone());
        assert_eq!(gate.request_permission().await, PermissionStatus::Granted);
        assert_eq!(platform.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_denied_is_never_reprompted() {
        let platform = Arc::new(RecordingPlatform::denied());
        let gate = gate(platform.clone());
        assert_eq!(gate.request_permission().await, PermissionStatus::Denied);
        assert_eq!(gate.request_permission().await, PermissionStatus::Denied);
        assert_eq!(platform.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_unset_prompts_exactly_once() {
        let platform = Arc::new(RecordingPlatform::unset_answering(PermissionStatus::Granted));
        let gate = gate(platform.clone());
        assert_eq!(gate.current_status(), PermissionStatus::Unset);
        assert_eq!(gate.request_permission().await, PermissionStatus::Granted);
        assert_eq!(gate.request_permission().await, PermissionStatus::Granted);
        assert_eq!(platform.prompt_count(), 1);
        assert_eq!(gate.current_status(), PermissionStatus::Granted);
    }

    #[tokio::test]
    async fn test_user_declining_prompt() {
        let platform = Arc::new(RecordingPlatform::unset_answering(PermissionStatus::Denied));
        let gate = gate(platform.clone());
        assert!(matches!(gate.ensure_granted().await, Err(NotifyError::PermissionDenied)));
        assert!(matches!(gate.ensure_granted().await, Err(NotifyError::PermissionDenied)));
        assert_eq!(platform.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_platform_never_prompts() {
        let platform = Arc::new(RecordingPlatform::unsupported());
        let gate = gate(platform.clone());
        assert!(!gate.check_support());
        assert_eq!(gate.request_permission().await, PermissionStatus::Denied);
        assert!(matches!(gate.ensure_granted().await, Err(NotifyError::UnsupportedPlatform)));
        assert_eq!(platform.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_agent_api_is_unsupported() {
        let platform = Arc::new(RecordingPlatform::granted());
        let gate = PermissionGate::new(platform, Arc::new(FakeAgentHost::new().unsupported()));
        assert!(!gate.check_support());
        assert!(matches!(gate.require_granted(), Err(NotifyError::UnsupportedPlatform)));
    }
}
