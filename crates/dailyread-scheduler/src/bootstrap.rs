//! Startup restore: re-register the agent and re-arm a persisted schedule,
//! at most once per process.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::notify::PermissionStatus;
use crate::service::NotificationService;

/// "Already restored" flag, owned by whoever owns the process lifetime.
#[derive(Debug, Default)]
pub struct RestoreGuard {
    restored: AtomicBool,
}

impl RestoreGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for the first caller only.
    pub fn claim(&self) -> bool {
        !self.restored.swap(true, Ordering::SeqCst)
    }

    pub fn is_restored(&self) -> bool {
        self.restored.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    AlreadyRestored,
    NothingPersisted,
    Disabled,
    PermissionNotGranted(PermissionStatus),
    /// Armed again. `persisted` is false when the recomputed record could not
    /// be written back; the trigger is live either way.
    Rearmed {
        next_fire_at: DateTime<Utc>,
        persisted: bool,
    },
}

pub async fn bootstrap(service: &NotificationService, guard: &RestoreGuard) -> RestoreOutcome {
    if !guard.claim() {
        tracing::debug!("Bootstrap already ran in this process");
        return RestoreOutcome::AlreadyRestored;
    }

    // Delivery falls back to direct when this fails.
    service.registrar().register().await;

    let descriptor = match service.store().load() {
        Ok(Some(descriptor)) => descriptor,
        Ok(None) => return RestoreOutcome::NothingPersisted,
        Err(e) => {
            tracing::warn!("⚠️ Unreadable schedule record, skipping restore: {e}");
            return RestoreOutcome::NothingPersisted;
        }
    };
    if !descriptor.enabled {
        return RestoreOutcome::Disabled;
    }
    let permission = service.gate().current_status();
    if permission != PermissionStatus::Granted {
        tracing::info!("🔕 Saved reminder not restored: permission {permission}");
        return RestoreOutcome::PermissionNotGranted(permission);
    }

    let restored = service.restore(&descriptor).await;
    if restored.persisted {
        tracing::info!("♻️ Restored daily reminder at {}", descriptor.time_of_day);
    } else {
        tracing::warn!(
            "⚠️ Restored daily reminder at {} but could not save it",
            descriptor.time_of_day
        );
    }
    RestoreOutcome::Rearmed {
        next_fire_at: restored.next_fire_at,
        persisted: restored.persisted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ScheduleDescriptor, ScheduleStore};
    use crate::testing::{FakeAgentHost, FakeClock, RecordingPlatform, utc};
    use dailyread_core::config::DailyReadConfig;
    use dailyread_core::error::{DailyReadError, Result as CoreResult};
    use std::sync::Arc;

    struct Harness {
        platform: Arc<RecordingPlatform>,
        host: Arc<FakeAgentHost>,
        service: NotificationService,
    }

    fn harness(now: &str, platform: RecordingPlatform, store: Arc<dyn ScheduleStore>) -> Harness {
        let platform = Arc::new(platform);
        let host = Arc::new(FakeAgentHost::new());
        let service = NotificationService::new(
            &DailyReadConfig::default(),
            Arc::new(FakeClock::new(utc(now))),
            store,
            platform.clone(),
            host.clone(),
        );
        Harness {
            platform,
            host,
            service,
        }
    }

    fn nine_am(next_fire_at: &str) -> ScheduleDescriptor {
        ScheduleDescriptor::new("09:00".parse().unwrap(), "Read now", utc(next_fire_at))
    }

    fn persisted(descriptor: &ScheduleDescriptor) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_raw(&descriptor.encode().unwrap()))
    }

    /// Loads a fixed record; every write fails.
    struct ReadOnlyStore(ScheduleDescriptor);

    impl ScheduleStore for ReadOnlyStore {
        fn load(&self) -> CoreResult<Option<ScheduleDescriptor>> {
            Ok(Some(self.0.clone()))
        }
        fn save(&self, _: &ScheduleDescriptor) -> CoreResult<()> {
            Err(DailyReadError::Storage("read-only volume".into()))
        }
        fn clear(&self) -> CoreResult<()> {
            Err(DailyReadError::Storage("read-only volume".into()))
        }
    }

    #[tokio::test]
    async fn test_elapsed_schedule_rearms_for_next_occurrence() {
        let store = persisted(&nine_am("2024-01-02T09:00:00Z"));
        let h = harness("2024-01-10T15:00:00Z", RecordingPlatform::granted(), store.clone());

        let outcome = bootstrap(&h.service, &RestoreGuard::new()).await;
        assert_eq!(
            outcome,
            RestoreOutcome::Rearmed {
                next_fire_at: utc("2024-01-11T09:00:00Z"),
                persisted: true,
            }
        );
        assert_eq!(h.host.install_count(), 1);
        assert!(h.service.poll().await.is_none());
        assert!(h.platform.shown().is_empty());
        assert!(h.host.posted().is_empty());
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.next_fire_at, utc("2024-01-11T09:00:00Z"));
    }

    #[tokio::test]
    async fn test_unwritable_store_still_rearms() {
        let store = Arc::new(ReadOnlyStore(nine_am("2024-01-02T09:00:00Z")));
        let h = harness("2024-01-05T12:00:00Z", RecordingPlatform::granted(), store);

        let outcome = bootstrap(&h.service, &RestoreGuard::new()).await;
        assert_eq!(
            outcome,
            RestoreOutcome::Rearmed {
                next_fire_at: utc("2024-01-06T09:00:00Z"),
                persisted: false,
            }
        );
        let status = h.service.notification_status().await;
        assert!(status.scheduled);
        assert_eq!(status.next_fire_at, Some(utc("2024-01-06T09:00:00Z")));
    }

    #[tokio::test]
    async fn test_second_bootstrap_is_noop() {
        let store = persisted(&nine_am("2024-01-02T09:00:00Z"));
        let h = harness("2024-01-01T12:00:00Z", RecordingPlatform::granted(), store);
        let guard = RestoreGuard::new();

        let first = bootstrap(&h.service, &guard).await;
        assert!(matches!(first, RestoreOutcome::Rearmed { .. }));
        let trigger = h.service.scheduler().lock().await.trigger();
        assert_eq!(bootstrap(&h.service, &guard).await, RestoreOutcome::AlreadyRestored);
        assert!(guard.is_restored());
        assert_eq!(h.service.scheduler().lock().await.trigger(), trigger);
        assert_eq!(h.host.install_count(), 1);
    }

    #[tokio::test]
    async fn test_independent_guards_per_instance() {
        let d = nine_am("2024-01-02T09:00:00Z");
        let first = harness("2024-01-01T12:00:00Z", RecordingPlatform::granted(), persisted(&d));
        let second = harness("2024-01-01T12:00:00Z", RecordingPlatform::granted(), persisted(&d));
        let a = bootstrap(&first.service, &RestoreGuard::new()).await;
        let b = bootstrap(&second.service, &RestoreGuard::new()).await;
        assert!(matches!(a, RestoreOutcome::Rearmed { .. }));
        assert!(matches!(b, RestoreOutcome::Rearmed { .. }));
    }

    #[tokio::test]
    async fn test_nothing_persisted_still_registers_agent() {
        let store = Arc::new(MemoryStore::new());
        let h = harness("2024-01-01T12:00:00Z", RecordingPlatform::granted(), store);
        assert_eq!(
            bootstrap(&h.service, &RestoreGuard::new()).await,
            RestoreOutcome::NothingPersisted
        );
        assert_eq!(h.host.install_count(), 1);
        assert!(!h.service.notification_status().await.scheduled);
    }

    #[tokio::test]
    async fn test_disabled_record_is_not_armed() {
        let mut d = nine_am("2024-01-02T09:00:00Z");
        d.enabled = false;
        let h = harness("2024-01-01T12:00:00Z", RecordingPlatform::granted(), persisted(&d));
        assert_eq!(bootstrap(&h.service, &RestoreGuard::new()).await, RestoreOutcome::Disabled);
        assert!(!h.service.notification_status().await.scheduled);
    }

    #[tokio::test]
    async fn test_revoked_permission_skips_restore() {
        let store = persisted(&nine_am("2024-01-02T09:00:00Z"));
        let h = harness("2024-01-01T12:00:00Z", RecordingPlatform::denied(), store);
        assert_eq!(
            bootstrap(&h.service, &RestoreGuard::new()).await,
            RestoreOutcome::PermissionNotGranted(PermissionStatus::Denied)
        );
        assert_eq!(h.platform.prompt_count(), 0);
        assert!(!h.service.notification_status().await.scheduled);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let store = Arc::new(MemoryStore::with_raw("{not json"));
        let h = harness("2024-01-01T12:00:00Z", RecordingPlatform::granted(), store);
        assert_eq!(
            bootstrap(&h.service, &RestoreGuard::new()).await,
            RestoreOutcome::NothingPersisted
        );
    }
}
