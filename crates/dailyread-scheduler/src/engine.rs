//! Schedule engine — owns the daily reminder.
//!
//! `Disabled → Arming → Armed → Firing → Armed …`. At most one `Trigger` is
//! live; every re-arm replaces it in one step, and `poll` only fires the live
//! one, so a cancelled trigger can never fire.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use crate::clock::Clock;
use crate::daily::{TimeOfDay, next_occurrence};
use crate::dispatch::{DeliveryChannel, DeliveryRoute};
use crate::error::NotifyError;
use crate::permission::PermissionGate;
use crate::store::{ScheduleDescriptor, ScheduleStore};

/// Longest the driver sleeps before re-reading the wall clock, which can jump
/// while the monotonic timer is asleep.
const MAX_DRIVER_SLEEP: StdDuration = StdDuration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Disabled,
    Arming,
    Armed,
    Firing,
}

/// A single-shot "fire at" token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub id: u64,
    pub fire_at: DateTime<Utc>,
}

/// Outcome of one firing.
#[derive(Debug)]
pub struct FireReport {
    pub scheduled_for: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
    pub delivery: Result<DeliveryRoute, NotifyError>,
    pub next_fire_at: DateTime<Utc>,
}

/// Re-arm result from a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restored {
    pub next_fire_at: DateTime<Utc>,
    /// False when the recomputed record could not be written back.
    pub persisted: bool,
}

pub type SharedScheduler = Arc<Mutex<Scheduler>>;

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    store: Arc<dyn ScheduleStore>,
    gate: Arc<PermissionGate>,
    delivery: Arc<DeliveryChannel>,
    state: ScheduleState,
    trigger: Option<Trigger>,
    descriptor: Option<ScheduleDescriptor>,
    next_trigger_id: u64,
}

impl Scheduler {
    /// Starts `Disabled`; persisted state is picked up by bootstrap.
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn ScheduleStore>,
        gate: Arc<PermissionGate>,
        delivery: Arc<DeliveryChannel>,
    ) -> Self {
        Self {
            clock,
            store,
            gate,
            delivery,
            state: ScheduleState::Disabled,
            trigger: None,
            descriptor: None,
            next_trigger_id: 1,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn ScheduleStore> {
        &self.store
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    pub fn trigger(&self) -> Option<Trigger> {
        self.trigger
    }

    pub fn descriptor(&self) -> Option<&ScheduleDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_scheduled(&self) -> bool {
        self.state == ScheduleState::Armed && self.trigger.is_some()
    }

    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.trigger.map(|t| t.fire_at)
    }

    /// Turn the reminder on. Requires granted permission.
    pub fn enable(
        &mut self,
        time: TimeOfDay,
        message: &str,
    ) -> Result<DateTime<Utc>, NotifyError> {
        self.gate.require_granted()?;
        let previous = self.state;
        self.state = ScheduleState::Arming;
        let now = self.clock.now();
        match self.arm(time, message, now) {
            Ok(at) => {
                tracing::info!("📅 Daily reminder enabled for {time}");
                Ok(at)
            }
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    /// Turn the reminder off. Safe to call repeatedly.
    pub fn disable(&mut self) -> Result<(), NotifyError> {
        let was_active = self.trigger.is_some() || self.descriptor.is_some();
        self.trigger = None;
        self.descriptor = None;
        self.state = ScheduleState::Disabled;
        self.store.clear()?;
        if was_active {
            tracing::info!("🚫 Daily reminder disabled");
        }
        Ok(())
    }

    pub fn update_time(&mut self, time: TimeOfDay) -> Result<DateTime<Utc>, NotifyError> {
        let message = self.armed_descriptor()?.message.clone();
        let now = self.clock.now();
        let at = self.arm(time, &message, now)?;
        tracing::info!("📅 Daily reminder moved to {time}");
        Ok(at)
    }

    pub fn update_message(&mut self, message: &str) -> Result<DateTime<Utc>, NotifyError> {
        let time = self.armed_descriptor()?.time_of_day;
        let now = self.clock.now();
        self.arm(time, message, now)
    }

    /// Re-arm from a persisted record. The stored `next_fire_at` is ignored
    /// and recomputed from the time of day, so a long-unloaded process gets the
    /// next valid occurrence and no backlog. The record is enabled, so a failed
    /// write-back still arms.
    pub fn restore(&mut self, descriptor: &ScheduleDescriptor) -> Restored {
        self.state = ScheduleState::Arming;
        let now = self.clock.now();
        let next = next_occurrence(descriptor.time_of_day, now, self.clock.as_ref());
        let rearmed = ScheduleDescriptor::new(descriptor.time_of_day, &descriptor.message, next);
        let persisted = self.persist_or_warn(&rearmed);
        Restored {
            next_fire_at: self.install(rearmed),
            persisted,
        }
    }

    /// Fire the live trigger if its instant has been reached.
    pub fn poll(&mut self) -> Option<FireReport> {
        let trigger = self.trigger?;
        let now = self.clock.now();
        if trigger.fire_at > now {
            return None;
        }
        self.fire(trigger, now)
    }

    fn fire(&mut self, trigger: Trigger, now: DateTime<Utc>) -> Option<FireReport> {
        let Some(descriptor) = self.descriptor.clone() else {
            self.trigger = None;
            self.state = ScheduleState::Disabled;
            return None;
        };
        self.state = ScheduleState::Firing;
        self.trigger = None;

        tracing::info!("🔔 Sending scheduled reminder...");
        let delivery = self.delivery.deliver_now(&descriptor.message);
        if let Err(e) = &delivery {
            tracing::warn!("⚠️ Scheduled reminder not delivered: {e}");
        }

        // Next slot strictly after the one just fired, from time of day + date.
        let after = now.max(trigger.fire_at);
        let next = next_occurrence(descriptor.time_of_day, after, self.clock.as_ref());
        let next_descriptor =
            ScheduleDescriptor::new(descriptor.time_of_day, &descriptor.message, next);
        self.persist_or_warn(&next_descriptor);
        self.install(next_descriptor);

        Some(FireReport {
            scheduled_for: trigger.fire_at,
            fired_at: now,
            delivery,
            next_fire_at: next,
        })
    }

    fn armed_descriptor(&self) -> Result<&ScheduleDescriptor, NotifyError> {
        match (&self.state, &self.descriptor) {
            (ScheduleState::Armed, Some(descriptor)) => Ok(descriptor),
            _ => Err(NotifyError::NotScheduled),
        }
    }

    fn persist_or_warn(&self, descriptor: &ScheduleDescriptor) -> bool {
        match self.store.save(descriptor) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Failed to persist reminder for {}: {e}",
                    descriptor.time_of_day
                );
                false
            }
        }
    }

    /// Persist the new record, then swap in its trigger.
    fn arm(
        &mut self,
        time: TimeOfDay,
        message: &str,
        after: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, NotifyError> {
        let next = next_occurrence(time, after, self.clock.as_ref());
        let descriptor = ScheduleDescriptor::new(time, message, next);
        self.store.save(&descriptor)?;
        Ok(self.install(descriptor))
    }

    fn install(&mut self, descriptor: ScheduleDescriptor) -> DateTime<Utc> {
        let fire_at = descriptor.next_fire_at;
        let id = self.next_trigger_id;
        self.next_trigger_id += 1;
        self.trigger = Some(Trigger { id, fire_at });
        self.descriptor = Some(descriptor);
        self.state = ScheduleState::Armed;

        let delay = fire_at - self.clock.now();
        tracing::info!("⏰ Next reminder in {} minutes", delay.num_minutes());
        tracing::debug!("Trigger {id} armed for {fire_at}");
        fire_at
    }
}

/// Drive the live trigger on the tokio timer. `wake` must be notified after
/// any change to the schedule.
pub fn spawn_trigger_driver(
    scheduler: SharedScheduler,
    wake: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("⏰ Reminder driver started");
        loop {
            let (trigger, clock) = {
                let engine = scheduler.lock().await;
                (engine.trigger(), engine.clock().clone())
            };

            let Some(trigger) = trigger else {
                wake.notified().await;
                continue;
            };

            let delay = (trigger.fire_at - clock.now())
                .to_std()
                .unwrap_or(StdDuration::ZERO)
                .min(MAX_DRIVER_SLEEP);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let report = scheduler.lock().await.poll();
                    if let Some(report) = report {
                        tracing::info!(
                            "📣 Reminder for {} handled ({}), next at {}",
                            report.scheduled_for,
                            match &report.delivery {
                                Ok(route) => format!("{route:?}"),
                                Err(e) => e.to_string(),
                            },
                            report.next_fire_at
                        );
                    }
                }
                _ = wake.notified() => {}
            }
        }
    })
}
