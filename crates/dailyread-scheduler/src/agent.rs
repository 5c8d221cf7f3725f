//! Background agent — a long-lived execution context that shows reminders
//! without a foreground page.
//!
//! The agent runs its own event loop and is reached only through its mailbox
//! (fire-and-forget `DELIVER`, request/response `QUERY_PERMISSION`).
//! `AgentRegistrar` is the only owner of the live `AgentHandle`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dailyread_core::config::AgentConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::NotifyError;
use crate::notify::{NotificationPlatform, NotificationTemplate, PermissionStatus};

/// Message posted from the foreground to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMessage {
    Deliver { message: String },
    QueryPermission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentReply {
    Permission(PermissionStatus),
}

/// Mailbox item: a message plus an optional reply slot.
#[derive(Debug)]
pub struct Envelope {
    pub message: AgentMessage,
    pub reply: Option<oneshot::Sender<AgentReply>>,
}

/// Agent lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Installing,
    Installed,
    Activating,
    Activated,
    /// Unregistered or stopped; never comes back.
    Redundant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRegistration {
    pub id: u64,
    pub script: String,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    pub script: String,
    pub scope: String,
    /// Always load the current script, never a cached copy.
    pub bypass_cache: bool,
}

impl From<&AgentConfig> for InstallOptions {
    fn from(config: &AgentConfig) -> Self {
        Self {
            script: config.script.clone(),
            scope: config.scope.clone(),
            bypass_cache: true,
        }
    }
}

/// A freshly installed agent, before it is known to be active.
pub struct InstalledAgent {
    pub registration: AgentRegistration,
    pub mailbox: mpsc::UnboundedSender<Envelope>,
    pub state: watch::Receiver<AgentState>,
}

/// Platform facility that hosts background agents for this origin.
#[async_trait]
pub trait AgentHost: Send + Sync {
    fn is_supported(&self) -> bool;

    /// All agents currently registered for this origin.
    async fn registrations(&self) -> Result<Vec<AgentRegistration>, String>;

    async fn unregister(&self, id: u64) -> Result<(), String>;

    async fn install(&self, options: &InstallOptions) -> Result<InstalledAgent, String>;
}

/// Reference to the active agent. Process-lifetime only.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    registration: AgentRegistration,
    mailbox: mpsc::UnboundedSender<Envelope>,
    state: watch::Receiver<AgentState>,
}

impl AgentHandle {
    fn from_installed(agent: InstalledAgent) -> Self {
        Self {
            registration: agent.registration,
            mailbox: agent.mailbox,
            state: agent.state,
        }
    }

    pub fn id(&self) -> u64 {
        self.registration.id
    }

    pub fn registration(&self) -> &AgentRegistration {
        &self.registration
    }

    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        !self.mailbox.is_closed() && self.state() == AgentState::Activated
    }

    /// Fire-and-forget post; the agent's own loop handles it later.
    pub fn post(&self, message: AgentMessage) -> Result<(), String> {
        if self.state() != AgentState::Activated {
            return Err(format!("agent {} is {:?}", self.id(), self.state()));
        }
        self.mailbox
            .send(Envelope {
                message,
                reply: None,
            })
            .map_err(|_| format!("agent {} mailbox closed", self.id()))
    }

    /// Ask the agent which permission it observes.
    pub async fn query_permission(&self) -> Result<PermissionStatus, String> {
        let (tx, rx) = oneshot::channel();
        self.mailbox
            .send(Envelope {
                message: AgentMessage::QueryPermission,
                reply: Some(tx),
            })
            .map_err(|_| format!("agent {} mailbox closed", self.id()))?;
        match rx.await {
            Ok(AgentReply::Permission(status)) => Ok(status),
            Err(_) => Err(format!("agent {} dropped the reply", self.id())),
        }
    }
}

/// Installs the background agent and holds the one live handle.
pub struct AgentRegistrar {
    host: Arc<dyn AgentHost>,
    options: InstallOptions,
    activation_timeout: Duration,
    slot: RwLock<Option<AgentHandle>>,
    register_lock: tokio::sync::Mutex<()>,
}

impl AgentRegistrar {
    pub fn new(host: Arc<dyn AgentHost>, config: &AgentConfig) -> Self {
        Self {
            host,
            options: InstallOptions::from(config),
            activation_timeout: Duration::from_secs(config.activation_timeout_secs),
            slot: RwLock::new(None),
            register_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.host.is_supported()
    }

    /// The live handle, if any.
    pub fn current(&self) -> Option<AgentHandle> {
        let slot = self.slot.read().ok()?;
        slot.as_ref().filter(|handle| handle.is_live()).cloned()
    }

    /// Register the agent, degrading to `None` on any failure.
    pub async fn register(&self) -> Option<AgentHandle> {
        match self.try_register().await {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("⚠️ {e}; falling back to direct delivery");
                None
            }
        }
    }

    /// Drop stale registrations, install the current script and wait (bounded)
    /// for activation. A second call reuses the live agent.
    pub async fn try_register(&self) -> Result<AgentHandle, NotifyError> {
        let _guard = self.register_lock.lock().await;
        if let Some(handle) = self.current() {
            tracing::debug!("Background agent {} already active", handle.id());
            return Ok(handle);
        }
        if !self.host.is_supported() {
            return Err(NotifyError::UnsupportedPlatform);
        }

        match self.host.registrations().await {
            Ok(stale) => {
                for registration in stale {
                    tracing::info!(
                        "🧹 Unregistering stale agent {} ({})",
                        registration.id,
                        registration.script
                    );
                    if let Err(e) = self.host.unregister(registration.id).await {
                        tracing::warn!("⚠️ Failed to unregister agent {}: {e}", registration.id);
                    }
                }
            }
            Err(e) => tracing::warn!("⚠️ Could not list agent registrations: {e}"),
        }

        let installed = self
            .host
            .install(&self.options)
            .await
            .map_err(NotifyError::Registration)?;
        let id = installed.registration.id;
        let mut state = installed.state.clone();

        let activation =
            tokio::time::timeout(self.activation_timeout, wait_activated(&mut state)).await;
        let failure = match activation {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(format!(
                "agent {id} not activated within {}s",
                self.activation_timeout.as_secs()
            )),
        };
        if let Some(reason) = failure {
            if let Err(e) = self.host.unregister(id).await {
                tracing::debug!("Cleanup of agent {id} failed: {e}");
            }
            return Err(NotifyError::Registration(reason));
        }

        let handle = AgentHandle::from_installed(installed);
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(handle.clone());
        }
        tracing::info!("✅ Background agent {id} active ({})", self.options.script);
        Ok(handle)
    }
}

async fn wait_activated(state: &mut watch::Receiver<AgentState>) -> Result<(), String> {
    let reached = *state
        .wait_for(|s| matches!(s, AgentState::Activated | AgentState::Redundant))
        .await
        .map_err(|_| "agent stopped during install".to_string())?;
    match reached {
        AgentState::Activated => Ok(()),
        _ => Err("agent became redundant during install".into()),
    }
}

// ─── In-process agent host ────────────────────────────────

struct LocalAgent {
    registration: AgentRegistration,
    state: Arc<watch::Sender<AgentState>>,
    task: tokio::task::JoinHandle<()>,
}

/// Hosts agents as independent tokio tasks rendering through `platform`.
pub struct LocalAgentHost {
    platform: Arc<dyn NotificationPlatform>,
    template: NotificationTemplate,
    next_id: AtomicU64,
    agents: Mutex<Vec<LocalAgent>>,
}

impl LocalAgentHost {
    pub fn new(platform: Arc<dyn NotificationPlatform>, template: NotificationTemplate) -> Self {
        Self {
            platform,
            template,
            next_id: AtomicU64::new(1),
            agents: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentHost for LocalAgentHost {
    fn is_supported(&self) -> bool {
        tokio::runtime::Handle::try_current().is_ok()
    }

    async fn registrations(&self) -> Result<Vec<AgentRegistration>, String> {
        let agents = self.agents.lock().map_err(|_| "agent table poisoned".to_string())?;
        Ok(agents.iter().map(|a| a.registration.clone()).collect())
    }

    async fn unregister(&self, id: u64) -> Result<(), String> {
        let mut agents = self.agents.lock().map_err(|_| "agent table poisoned".to_string())?;
        let Some(pos) = agents.iter().position(|a| a.registration.id == id) else {
            return Err(format!("agent {id} not registered"));
        };
        let agent = agents.remove(pos);
        agent.state.send_replace(AgentState::Redundant);
        agent.task.abort();
        Ok(())
    }

    async fn install(&self, options: &InstallOptions) -> Result<InstalledAgent, String> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| format!("no runtime for background agent: {e}"))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = AgentRegistration {
            id,
            script: options.script.clone(),
            scope: options.scope.clone(),
        };

        let (mailbox, inbox) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(AgentState::Installing);
        let state = Arc::new(state_tx);
        let task = runtime.spawn(run_agent(
            id,
            inbox,
            state.clone(),
            self.platform.clone(),
            self.template.clone(),
        ));

        let mut agents = self.agents.lock().map_err(|_| "agent table poisoned".to_string())?;
        agents.push(LocalAgent {
            registration: registration.clone(),
            state,
            task,
        });
        Ok(InstalledAgent {
            registration,
            mailbox,
            state: state_rx,
        })
    }
}

impl Drop for LocalAgentHost {
    fn drop(&mut self) {
        if let Ok(agents) = self.agents.get_mut() {
            for agent in agents.drain(..) {
                agent.task.abort();
            }
        }
    }
}

/// The agent's own event loop.
async fn run_agent(
    id: u64,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
    state: Arc<watch::Sender<AgentState>>,
    platform: Arc<dyn NotificationPlatform>,
    template: NotificationTemplate,
) {
    state.send_replace(AgentState::Installed);
    state.send_replace(AgentState::Activating);
    state.send_replace(AgentState::Activated);
    tracing::debug!("🛰️ Agent {id} event loop running");

    while let Some(envelope) = inbox.recv().await {
        handle_envelope(id, envelope, platform.as_ref(), &template);
    }

    state.send_replace(AgentState::Redundant);
    tracing::debug!("Agent {id} mailbox closed");
}

fn handle_envelope(
    id: u64,
    envelope: Envelope,
    platform: &dyn NotificationPlatform,
    template: &NotificationTemplate,
) {
    match envelope.message {
        AgentMessage::Deliver { message } => {
            let notification = template.render(&message);
            match platform.show(&notification) {
                Ok(()) => tracing::info!("🔔 Agent {id} showed reminder ({})", notification.tag),
                Err(e) => tracing::warn!("⚠️ Agent {id} failed to show reminder: {e}"),
            }
        }
        AgentMessage::QueryPermission => {
            if let Some(reply) = envelope.reply {
                let _ = reply.send(AgentReply::Permission(platform.permission()));
            }
        }
    }
}
