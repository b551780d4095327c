use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, error, info, warn};

use super::notifier::{DispatchError, Notifier};
use super::registry::{AlarmJob, PendingAlarm, TimerRegistry};
use super::store::ScheduleStore;

/// Result of one timer firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Completed,
    /// The schedule was deleted before its alarm came due.
    Missing,
    /// Deactivated or already completed.
    Skipped,
    /// The schedule was moved to another time after this timer was taken.
    Stale,
    /// Another dispatch for the same schedule had not finished yet.
    AlreadyFiring,
    NoRecipient,
    Failed,
}

/// Runs the delivery side of a due alarm.
pub struct Dispatcher {
    store: Arc<dyn ScheduleStore>,
    notifier: Arc<dyn Notifier>,
    send_timeout: Duration,
    in_flight: Mutex<HashSet<i64>>,
}

/// Holds a schedule id in the in-flight set until dropped.
struct FiringGuard<'a> {
    in_flight: &'a Mutex<HashSet<i64>>,
    schedule_id: i64,
}

impl Drop for FiringGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.schedule_id);
    }
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        notifier: Arc<dyn Notifier>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            send_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, schedule_id: i64) -> Option<FiringGuard<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.insert(schedule_id).then(|| FiringGuard {
            in_flight: &self.in_flight,
            schedule_id,
        })
    }

    /// Delivers `job` and marks its schedule complete on success.
    ///
    /// Failures are logged and leave the schedule untouched; nothing is
    /// re-registered. At most one dispatch per schedule runs at a time.
    pub async fn on_fire(&self, job: &AlarmJob) -> FireOutcome {
        let Some(_guard) = self.claim(job.schedule_id) else {
            debug!("schedule {} is already being dispatched", job.schedule_id);
            return FireOutcome::AlreadyFiring;
        };

        // The record is re-read so edits made after registration win.
        let schedule = match self.store.get(job.schedule_id).await {
            Ok(Some(schedule)) => schedule,
            Ok(None) => {
                debug!("schedule {} vanished before its alarm", job.schedule_id);
                return FireOutcome::Missing;
            }
            Err(err) => {
                error!("failed to load schedule {}: {}", job.schedule_id, err);
                return FireOutcome::Failed;
            }
        };

        if !schedule.wants_alarm() {
            debug!("schedule {} no longer wants an alarm", schedule.id);
            return FireOutcome::Skipped;
        }
        if schedule.scheduled_time != job.scheduled_time {
            debug!("schedule {} was moved; dropping old timer", schedule.id);
            return FireOutcome::Stale;
        }

        let recipient = match self.store.recipient(schedule.owner_id).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => {
                warn!("owner {} of schedule {} not found", schedule.owner_id, schedule.id);
                return FireOutcome::NoRecipient;
            }
            Err(err) => {
                error!("failed to load owner of schedule {}: {}", schedule.id, err);
                return FireOutcome::Failed;
            }
        };

        // A hung transport counts as a failed send.
        let sent = timeout(
            self.send_timeout,
            self.notifier.send(&recipient.email, &job.title, &job.body),
        )
        .await
        .unwrap_or(Err(DispatchError::Timeout(self.send_timeout)));

        if let Err(err) = sent {
            warn!(
                "{} dispatch for schedule {} failed: {}",
                self.notifier.name(),
                schedule.id,
                err
            );
            return FireOutcome::Failed;
        }

        match self.store.mark_completed(schedule.id).await {
            Ok(true) => {
                info!("alarm for schedule {} delivered to user {}", schedule.id, recipient.user_id);
                FireOutcome::Completed
            }
            Ok(false) => FireOutcome::Missing,
            Err(err) => {
                error!("alarm sent but schedule {} not marked complete: {}", schedule.id, err);
                FireOutcome::Failed
            }
        }
    }
}

enum Command {
    Register(AlarmJob),
    Cancel(i64),
    Pending(oneshot::Sender<Vec<PendingAlarm>>),
    Shutdown,
}

/// Handle to the task that owns every pending alarm timer.
///
/// All registry mutations go through one channel, so `register` and
/// `cancel` for the same schedule apply in the order they were sent and
/// at most one timer per schedule is ever live.
#[derive(Clone)]
pub struct NotificationScheduler {
    commands: mpsc::UnboundedSender<Command>,
}

impl NotificationScheduler {
    /// Spawns the timer task. Due alarms run on at most `workers` tasks at once.
    pub fn start(dispatcher: Arc<Dispatcher>, workers: usize) -> (Self, JoinHandle<()>) {
        let (commands, inbox) = mpsc::unbounded_channel();
        let timer_loop = TimerLoop {
            inbox,
            registry: TimerRegistry::new(),
            dispatcher,
            workers: Arc::new(Semaphore::new(workers.max(1))),
        };
        let handle = tokio::spawn(timer_loop.run());

        (Self { commands }, handle)
    }

    /// Creates or replaces the timer for `job.schedule_id`.
    pub fn register(&self, job: AlarmJob) {
        let schedule_id = job.schedule_id;
        if self.commands.send(Command::Register(job)).is_err() {
            warn!("scheduler stopped; alarm for schedule {} not registered", schedule_id);
        }
    }

    /// Drops the timer for `schedule_id` if one is pending.
    pub fn cancel(&self, schedule_id: i64) {
        if self.commands.send(Command::Cancel(schedule_id)).is_err() {
            debug!("scheduler stopped; nothing to cancel for {}", schedule_id);
        }
    }

    /// Pending alarms, earliest first. Reflects every command sent before the call.
    pub async fn pending(&self) -> Vec<PendingAlarm> {
        let (reply, answer) = oneshot::channel();
        if self.commands.send(Command::Pending(reply)).is_err() {
            return Vec::new();
        }
        answer.await.unwrap_or_default()
    }

    pub async fn is_pending(&self, schedule_id: i64) -> bool {
        self.pending()
            .await
            .iter()
            .any(|alarm| alarm.schedule_id == schedule_id)
    }

    /// Stops the timer task. Alarms still pending are dropped.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

enum Event {
    Command(Option<Command>),
    Due,
}

struct TimerLoop {
    inbox: mpsc::UnboundedReceiver<Command>,
    registry: TimerRegistry,
    dispatcher: Arc<Dispatcher>,
    workers: Arc<Semaphore>,
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl TimerLoop {
    async fn run(mut self) {
        info!("notification scheduler started");
        loop {
            let deadline = self.registry.next_deadline();
            // Wake on a command or on the earliest deadline
            let event = tokio::select! {
                command = self.inbox.recv() => Event::Command(command),
                _ = sleep_until_deadline(deadline) => Event::Due,
            };

            match event {
                Event::Command(Some(Command::Shutdown)) | Event::Command(None) => break,
                Event::Command(Some(command)) => self.handle(command),
                Event::Due => self.fire_due(),
            }
        }
        info!(
            "notification scheduler stopped with {} pending alarms",
            self.registry.len()
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register(job) => {
                // Past-due alarms fire on the next turn of the loop.
                let delay = (job.scheduled_time - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                let schedule_id = job.schedule_id;
                let replaced = self.registry.install(job, Instant::now() + delay);
                debug!(
                    "alarm for schedule {} due in {:?}{}",
                    schedule_id,
                    delay,
                    if replaced.is_some() { " (replaced)" } else { "" }
                );
            }
            Command::Cancel(schedule_id) => {
                if self.registry.remove(schedule_id).is_some() {
                    debug!("alarm for schedule {} cancelled", schedule_id);
                }
            }
            Command::Pending(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn fire_due(&mut self) {
        for job in self.registry.pop_due(Instant::now()) {
            let dispatcher = Arc::clone(&self.dispatcher);
            let workers = Arc::clone(&self.workers);
            // Jobs wait here for a worker slot, not in the timer loop.
            tokio::spawn(async move {
                let Ok(_permit) = workers.acquire_owned().await else {
                    return;
                };
                let outcome = dispatcher.on_fire(&job).await;
                debug!("schedule {} fired: {:?}", job.schedule_id, outcome);
            });
        }
    }
}
