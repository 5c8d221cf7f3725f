//! NotificationService — the interface the rest of the app calls into.
//!
//! Wires the permission gate, registrar, delivery channel and schedule engine
//! around one injected clock, store, platform and agent host.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dailyread_core::config::DailyReadConfig;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};

use crate::agent::{AgentHost, AgentRegistrar};
use crate::clock::Clock;
use crate::daily::{TimeOfDay, next_occurrence};
use crate::dispatch::{DeliveryChannel, DeliveryRoute};
use crate::engine::{FireReport, Restored, Scheduler, SharedScheduler, spawn_trigger_driver};
use crate::error::NotifyError;
use crate::notify::{NotificationPlatform, NotificationTemplate, PermissionStatus};
use crate::permission::PermissionGate;
use crate::store::{ScheduleDescriptor, ScheduleStore};

/// Snapshot for settings screens and `dailyread status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStatus {
    pub permission: PermissionStatus,
    pub scheduled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_fire_at: Option<DateTime<Utc>>,
}

pub struct NotificationService {
    default_message: String,
    clock: Arc<dyn Clock>,
    store: Arc<dyn ScheduleStore>,
    registrar: Arc<AgentRegistrar>,
    gate: Arc<PermissionGate>,
    delivery: Arc<DeliveryChannel>,
    scheduler: SharedScheduler,
    wake: Arc<Notify>,
}

impl NotificationService {
    pub fn new(
        config: &DailyReadConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn ScheduleStore>,
        platform: Arc<dyn NotificationPlatform>,
        agent_host: Arc<dyn AgentHost>,
    ) -> Self {
        let registrar = Arc::new(AgentRegistrar::new(agent_host.clone(), &config.agent));
        let gate = Arc::new(PermissionGate::new(platform.clone(), agent_host));
        let delivery = Arc::new(DeliveryChannel::new(
            registrar.clone(),
            platform,
            gate.clone(),
            NotificationTemplate::new(config.notifications.clone()),
        ));
        let scheduler =
            Scheduler::new(clock.clone(), store.clone(), gate.clone(), delivery.clone());
        Self {
            default_message: config.notifications.default_message.clone(),
            clock,
            store,
            registrar,
            gate,
            delivery,
            scheduler: Arc::new(Mutex::new(scheduler)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn registrar(&self) -> &Arc<AgentRegistrar> {
        &self.registrar
    }

    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    pub fn store(&self) -> &Arc<dyn ScheduleStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.scheduler
    }

    /// Ask for permission if needed, make sure an agent is registered, then
    /// arm the daily reminder.
    pub async fn enable_notifications(
        &self,
        time: &str,
        message: &str,
    ) -> Result<DateTime<Utc>, NotifyError> {
        let time: TimeOfDay = time.parse()?;
        self.gate.ensure_granted().await?;
        if self.registrar.current().is_none() {
            self.registrar.register().await;
        }
        let message = self.message_or_default(message);
        let at = self.scheduler.lock().await.enable(time, &message)?;
        self.wake.notify_one();
        Ok(at)
    }

    pub async fn disable_notifications(&self) -> Result<(), NotifyError> {
        self.scheduler.lock().await.disable()?;
        self.wake.notify_one();
        Ok(())
    }

    pub async fn update_notification_time(
        &self,
        time: &str,
    ) -> Result<DateTime<Utc>, NotifyError> {
        let time: TimeOfDay = time.parse()?;
        let at = self.scheduler.lock().await.update_time(time)?;
        self.wake.notify_one();
        Ok(at)
    }

    pub async fn update_notification_message(
        &self,
        message: &str,
    ) -> Result<DateTime<Utc>, NotifyError> {
        let message = self.message_or_default(message);
        let at = self.scheduler.lock().await.update_message(&message)?;
        self.wake.notify_one();
        Ok(at)
    }

    /// Deliver right away, outside the schedule.
    pub async fn send_test_notification(
        &self,
        message: &str,
    ) -> Result<DeliveryRoute, NotifyError> {
        let message = self.message_or_default(message);
        self.delivery.deliver_now(&message)
    }

    pub async fn notification_status(&self) -> NotificationStatus {
        let engine = self.scheduler.lock().await;
        NotificationStatus {
            permission: self.gate.current_status(),
            scheduled: engine.is_scheduled(),
            next_fire_at: engine.next_fire_at(),
        }
    }

    /// Status from the persisted record alone. Arms nothing, registers no
    /// agent and leaves the store untouched.
    pub fn saved_status(&self) -> Result<NotificationStatus, NotifyError> {
        let permission = self.gate.current_status();
        let next_fire_at = match self.store.load()? {
            Some(saved) if saved.enabled && permission == PermissionStatus::Granted => Some(
                next_occurrence(saved.time_of_day, self.clock.now(), self.clock.as_ref()),
            ),
            _ => None,
        };
        Ok(NotificationStatus {
            permission,
            scheduled: next_fire_at.is_some(),
            next_fire_at,
        })
    }

    /// Fire the schedule if due, for callers driving time themselves.
    pub async fn poll(&self) -> Option<FireReport> {
        self.scheduler.lock().await.poll()
    }

    /// Re-arm from a persisted record and wake the driver.
    pub(crate) async fn restore(&self, descriptor: &ScheduleDescriptor) -> Restored {
        let restored = self.scheduler.lock().await.restore(descriptor);
        self.wake.notify_one();
        restored
    }

    pub fn spawn_driver(&self) -> tokio::task::JoinHandle<()> {
        spawn_trigger_driver(self.scheduler.clone(), self.wake.clone())
    }

    fn message_or_default(&self, message: &str) -> String {
        if message.trim().is_empty() {
            self.default_message.clone()
        } else {
            message.to_string()
        }
    }
}
