//! Deterministic stand-ins for the clock, the notification platform and the
//! agent host. Used by the unit tests and by embedders' own tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use tokio::sync::{mpsc, watch};

use crate::agent::{
    AgentHost, AgentMessage, AgentRegistration, AgentState, Envelope, InstallOptions,
    InstalledAgent,
};
use crate::clock::Clock;
use crate::notify::{Notification, NotificationPlatform, PermissionStatus};

/// Parse an RFC 3339 instant. Panics on malformed input.
pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| panic!("bad test instant {s}: {e}"))
}

/// Settable clock with a fixed offset, optionally switching offset once.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
    shift: Option<(DateTime<Utc>, FixedOffset)>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    pub fn with_offset(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
            shift: None,
        }
    }

    /// From `at` onwards the local offset is `offset`.
    pub fn shifting_at(mut self, at: DateTime<Utc>, offset: FixedOffset) -> Self {
        self.shift = Some((at, offset));
        self
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }

    fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        match self.shift {
            Some((at, offset)) if instant >= at => offset,
            _ => self.offset,
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|e| *e.into_inner())
    }

    fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset_at(instant)).naive_local()
    }

    fn from_local(&self, local: NaiveDateTime) -> LocalResult<DateTime<Utc>> {
        let mut offsets = vec![self.offset];
        if let Some((_, shifted)) = self.shift {
            offsets.push(shifted);
        }
        let mut hits: Vec<DateTime<Utc>> = offsets
            .into_iter()
            .filter_map(|offset| {
                let at = offset.from_local_datetime(&local).single()?.with_timezone(&Utc);
                (self.offset_at(at) == offset).then_some(at)
            })
            .collect();
        hits.sort();
        hits.dedup();
        match hits.as_slice() {
            [] => LocalResult::None,
            [one] => LocalResult::Single(*one),
            [first, second, ..] => LocalResult::Ambiguous(*first, *second),
        }
    }
}

/// Notification platform with scripted consent and recorded output.
pub struct RecordingPlatform {
    supported: AtomicBool,
    permission: Mutex<PermissionStatus>,
    prompt_answer: Mutex<PermissionStatus>,
    prompts: AtomicUsize,
    fail_show: AtomicBool,
    shown: Mutex<Vec<Notification>>,
}

impl RecordingPlatform {
    fn with(permission: PermissionStatus, answer: PermissionStatus) -> Self {
        Self {
            supported: AtomicBool::new(true),
            permission: Mutex::new(permission),
            prompt_answer: Mutex::new(answer),
            prompts: AtomicUsize::new(0),
            fail_show: AtomicBool::new(false),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn granted() -> Self {
        Self::with(PermissionStatus::Granted, PermissionStatus::Granted)
    }

    pub fn denied() -> Self {
        Self::with(PermissionStatus::Denied, PermissionStatus::Denied)
    }

    /// Permission not decided yet; the prompt answers `answer`.
    pub fn unset_answering(answer: PermissionStatus) -> Self {
        Self::with(PermissionStatus::Unset, answer)
    }

    pub fn unsupported() -> Self {
        let platform = Self::with(PermissionStatus::Unset, PermissionStatus::Granted);
        platform.supported.store(false, Ordering::SeqCst);
        platform
    }

    pub fn set_permission(&self, status: PermissionStatus) {
        if let Ok(mut guard) = self.permission.lock() {
            *guard = status;
        }
    }

    pub fn fail_deliveries(&self, fail: bool) {
        self.fail_show.store(fail, Ordering::SeqCst);
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Every notification shown, in order.
    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// What is on screen: the latest notification per tag.
    pub fn visible(&self) -> Vec<Notification> {
        let mut by_tag = BTreeMap::new();
        for n in self.shown() {
            by_tag.insert(n.tag.clone(), n);
        }
        by_tag.into_values().collect()
    }
}

#[async_trait]
impl NotificationPlatform for RecordingPlatform {
    fn name(&self) -> &str {
        "recording"
    }

    fn supports_notifications(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    fn permission(&self) -> PermissionStatus {
        self.permission.lock().map(|g| *g).unwrap_or_default()
    }

    async fn prompt_permission(&self) -> PermissionStatus {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let answer = self.prompt_answer.lock().map(|g| *g).unwrap_or_default();
        self.set_permission(answer);
        answer
    }

    fn show(&self, notification: &Notification) -> Result<(), String> {
        if self.fail_show.load(Ordering::SeqCst) {
            return Err("platform refused notification".into());
        }
        if self.permission() != PermissionStatus::Granted {
            return Err("permission not granted".into());
        }
        let mut shown = self.shown.lock().map_err(|_| "poisoned".to_string())?;
        shown.push(notification.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationMode {
    Immediate,
    /// Stays in `Installing` forever.
    Never,
    FailInstall,
}

struct FakeAgent {
    registration: AgentRegistration,
    state: watch::Sender<AgentState>,
    inbox: Option<mpsc::UnboundedReceiver<Envelope>>,
}

/// Agent host that records installs and keeps posted messages for inspection.
pub struct FakeAgentHost {
    supported: bool,
    activation: ActivationMode,
    next_id: AtomicU64,
    installs: AtomicUsize,
    unregisters: AtomicUsize,
    agents: Mutex<Vec<FakeAgent>>,
}

impl FakeAgentHost {
    pub fn new() -> Self {
        Self {
            supported: true,
            activation: ActivationMode::Immediate,
            next_id: AtomicU64::new(100),
            installs: AtomicUsize::new(0),
            unregisters: AtomicUsize::new(0),
            agents: Mutex::new(Vec::new()),
        }
    }

    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    pub fn with_activation(mut self, mode: ActivationMode) -> Self {
        self.activation = mode;
        self
    }

    /// Pretend `count` agents from an earlier deployment are still registered.
    pub fn with_stale_registrations(self, count: u64) -> Self {
        if let Ok(mut agents) = self.agents.lock() {
            for id in 1..=count {
                let (state, _) = watch::channel(AgentState::Activated);
                agents.push(FakeAgent {
                    registration: AgentRegistration {
                        id,
                        script: "/sw-old.js".into(),
                        scope: "/".into(),
                    },
                    state,
                    inbox: None,
                });
            }
        }
        self
    }

    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn unregister_count(&self) -> usize {
        self.unregisters.load(Ordering::SeqCst)
    }

    /// Drain every message posted to any live agent.
    pub fn posted(&self) -> Vec<AgentMessage> {
        let mut out = Vec::new();
        if let Ok(mut agents) = self.agents.lock() {
            for agent in agents.iter_mut() {
                if let Some(inbox) = agent.inbox.as_mut() {
                    while let Ok(envelope) = inbox.try_recv() {
                        out.push(envelope.message);
                    }
                }
            }
        }
        out
    }

    /// Kill an agent as the platform would, leaving its handle dead.
    pub fn crash(&self, id: u64) {
        if let Ok(mut agents) = self.agents.lock() {
            if let Some(agent) = agents.iter_mut().find(|a| a.registration.id == id) {
                agent.state.send_replace(AgentState::Redundant);
                agent.inbox = None;
            }
        }
    }
}

impl Default for FakeAgentHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentHost for FakeAgentHost {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn registrations(&self) -> Result<Vec<AgentRegistration>, String> {
        let agents = self.agents.lock().map_err(|_| "poisoned".to_string())?;
        Ok(agents.iter().map(|a| a.registration.clone()).collect())
    }

    async fn unregister(&self, id: u64) -> Result<(), String> {
        let mut agents = self.agents.lock().map_err(|_| "poisoned".to_string())?;
        let before = agents.len();
        agents.retain(|a| {
            if a.registration.id == id {
                a.state.send_replace(AgentState::Redundant);
                false
            } else {
                true
            }
        });
        if agents.len() == before {
            return Err(format!("agent {id} not registered"));
        }
        self.unregisters.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn install(&self, options: &InstallOptions) -> Result<InstalledAgent, String> {
        if self.activation == ActivationMode::FailInstall {
            return Err("script evaluation failed".into());
        }
        self.installs.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let registration = AgentRegistration {
            id,
            script: options.script.clone(),
            scope: options.scope.clone(),
        };
        let initial = match self.activation {
            ActivationMode::Immediate => AgentState::Activated,
            _ => AgentState::Installing,
        };
        let (state, state_rx) = watch::channel(initial);
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let mut agents = self.agents.lock().map_err(|_| "poisoned".to_string())?;
        agents.push(FakeAgent {
            registration: registration.clone(),
            state,
            inbox: Some(inbox),
        });
        Ok(InstalledAgent {
            registration,
            mailbox,
            state: state_rx,
        })
    }
}
