//! # DailyRead Scheduler
//!
//! Daily reading reminders: permission, background delivery agent, recurring
//! schedule and restore-on-startup.
//!
//! ## Architecture
//! ```text
//! NotificationService (enable / disable / set time / test / status)
//!   ├── PermissionGate: unset → prompt once → granted | denied
//!   ├── Scheduler (single live Trigger, persisted ScheduleDescriptor)
//!   │     └── on fire → DeliveryChannel → re-arm next day
//!   ├── DeliveryChannel
//!   │     ├── Agent(AgentHandle)  — post DELIVER to the background agent
//!   │     └── Direct              — render on the platform surface
//!   └── AgentRegistrar: drop stale agents → install → wait for Activated
//!
//! bootstrap(): register agent → read descriptor → re-arm from time of day
//! ```

pub mod agent;
pub mod bootstrap;
pub mod clock;
pub mod daily;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod notify;
pub mod permission;
pub mod persistence;
pub mod service;
pub mod store;
pub mod terminal;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{AgentHandle, AgentHost, AgentMessage, AgentRegistrar, LocalAgentHost};
pub use bootstrap::{RestoreGuard, RestoreOutcome, bootstrap};
pub use clock::{Clock, SystemClock};
pub use daily::TimeOfDay;
pub use dispatch::{DeliveryChannel, DeliveryRoute, DeliveryTarget, Navigation, handle_activation};
pub use engine::{FireReport, Restored, ScheduleState, Scheduler, Trigger};
pub use error::NotifyError;
pub use notify::{Notification, NotificationPlatform, NotificationTemplate, PermissionStatus};
pub use permission::PermissionGate;
pub use persistence::SqliteStore;
pub use service::{NotificationService, NotificationStatus};
pub use store::{JsonFileStore, MemoryStore, ScheduleDescriptor, ScheduleStore};
pub use terminal::TerminalPlatform;
