//! Delivery channel — shows a reminder now, through the background agent when
//! one is live, otherwise directly on the platform surface.

use std::sync::Arc;

use serde::Serialize;

use crate::agent::{AgentHandle, AgentMessage, AgentRegistrar};
use crate::error::NotifyError;
use crate::notify::{ACTION_CLOSE, NotificationPlatform, NotificationTemplate};
use crate::permission::PermissionGate;

/// Where a delivery goes, chosen once per call.
#[derive(Debug, Clone)]
pub enum DeliveryTarget {
    Agent(AgentHandle),
    Direct,
}

/// Which path actually carried a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryRoute {
    Agent,
    Direct,
}

pub struct DeliveryChannel {
    registrar: Arc<AgentRegistrar>,
    platform: Arc<dyn NotificationPlatform>,
    gate: Arc<PermissionGate>,
    template: NotificationTemplate,
}

impl DeliveryChannel {
    pub fn new(
        registrar: Arc<AgentRegistrar>,
        platform: Arc<dyn NotificationPlatform>,
        gate: Arc<PermissionGate>,
        template: NotificationTemplate,
    ) -> Self {
        Self {
            registrar,
            platform,
            gate,
            template,
        }
    }

    pub fn template(&self) -> &NotificationTemplate {
        &self.template
    }

    pub fn target(&self) -> DeliveryTarget {
        match self.registrar.current() {
            Some(handle) => DeliveryTarget::Agent(handle),
            None => DeliveryTarget::Direct,
        }
    }

    /// Show exactly one notification carrying the configured tag. Fails only
    /// when permission is missing or the direct fallback also fails.
    pub fn deliver_now(&self, message: &str) -> Result<DeliveryRoute, NotifyError> {
        self.gate.require_granted()?;

        if let DeliveryTarget::Agent(handle) = self.target() {
            match handle.post(AgentMessage::Deliver {
                message: message.to_string(),
            }) {
                Ok(()) => {
                    tracing::info!("✅ Reminder sent to background agent {}", handle.id());
                    return Ok(DeliveryRoute::Agent);
                }
                Err(e) => tracing::warn!("⚠️ Agent post failed ({e}), delivering directly"),
            }
        }

        let notification = self.template.render(message);
        self.platform
            .show(&notification)
            .map_err(NotifyError::Delivery)?;
        tracing::info!("✅ Reminder shown directly via {}", self.platform.name());
        Ok(DeliveryRoute::Direct)
    }
}

/// An app window the agent can focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
    pub id: u64,
    pub url: String,
    pub focusable: bool,
}

/// What to do after the user interacts with a delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Focus { client_id: u64 },
    Open { route: String },
    None,
}

/// Resolve a notification interaction. `close` dismisses; anything else
/// (including a plain body click, `action == None`) focuses a window already
/// at the target route, or opens one.
pub fn handle_activation(
    action: Option<&str>,
    data_url: Option<&str>,
    default_route: &str,
    clients: &[ClientWindow],
) -> Navigation {
    if action == Some(ACTION_CLOSE) {
        return Navigation::None;
    }
    let route = data_url
        .filter(|url| !url.trim().is_empty())
        .unwrap_or(default_route);
    if let Some(client) = clients.iter().find(|c| c.focusable && c.url == route) {
        return Navigation::Focus {
            client_id: client.id,
        };
    }
    Navigation::Open {
        route: route.to_string(),
    }
}
