// Schedules and the alarms fired for them

pub mod entity;
pub mod notifier;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use entity::{NewSchedule, Schedule, ScheduleChanges};
pub use notifier::{DispatchError, LogNotifier, Notifier, WebhookNotifier, build_notifier};
pub use registry::{AlarmJob, PendingAlarm, TimerRegistry};
pub use scheduler::{Dispatcher, FireOutcome, NotificationScheduler};
pub use store::{MemoryScheduleStore, PgScheduleStore, Recipient, ScheduleStore, StoreError};
