use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use otters_backend::schedule::{
    AlarmJob, DispatchError, Dispatcher, FireOutcome, MemoryScheduleStore, NewSchedule,
    NotificationScheduler, Notifier, Recipient, Schedule, ScheduleStore,
};

#[derive(Clone, Copy)]
enum Behaviour {
    Deliver,
    Fail,
    Hang,
    Slow(Duration),
}

/// Notifier that remembers every attempt.
struct RecordingNotifier {
    behaviour: Behaviour,
    attempts: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            attempts: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), DispatchError> {
        self.attempts
            .lock()
            .unwrap()
            .push((recipient.to_string(), subject.to_string()));
        match self.behaviour {
            Behaviour::Deliver => Ok(()),
            Behaviour::Fail => Err(DispatchError::Rejected(503)),
            Behaviour::Hang => std::future::pending().await,
            Behaviour::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct Harness {
    store: Arc<MemoryScheduleStore>,
    notifier: Arc<RecordingNotifier>,
    dispatcher: Arc<Dispatcher>,
    scheduler: NotificationScheduler,
}

async fn harness(behaviour: Behaviour) -> Harness {
    let store = Arc::new(MemoryScheduleStore::new());
    store
        .add_recipient(Recipient {
            user_id: 1,
            email: "owner@example.com".into(),
            name: "Owner".into(),
        })
        .await;
    let notifier = RecordingNotifier::new(behaviour);
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        notifier.clone(),
        Duration::from_secs(5),
    ));
    let (scheduler, _task) = NotificationScheduler::start(dispatcher.clone(), 4);

    Harness {
        store,
        notifier,
        dispatcher,
        scheduler,
    }
}

async fn schedule_in(store: &MemoryScheduleStore, delay: chrono::Duration) -> Schedule {
    store
        .create(NewSchedule {
            owner_id: 1,
            title: "wake up".into(),
            description: Some("alarm".into()),
            scheduled_time: Utc::now() + delay,
        })
        .await
        .unwrap()
}

async fn is_completed(store: &MemoryScheduleStore, id: i64) -> bool {
    store.get(id).await.unwrap().map(|s| s.is_completed).unwrap_or(false)
}

#[tokio::test(start_paused = true)]
async fn due_alarm_fires_once_and_completes_schedule() {
    let h = harness(Behaviour::Deliver).await;
    let schedule = schedule_in(&h.store, chrono::Duration::seconds(2)).await;

    h.scheduler.register(AlarmJob::from(&schedule));
    assert!(h.scheduler.is_pending(schedule.id).await);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.notifier.attempts(), 0);
    assert!(!is_completed(&h.store, schedule.id).await);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.notifier.attempts(), 1);
    assert!(is_completed(&h.store, schedule.id).await);
    assert!(h.scheduler.pending().await.is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.notifier.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_alarm_never_fires() {
    let h = harness(Behaviour::Deliver).await;
    let schedule = schedule_in(&h.store, chrono::Duration::seconds(2)).await;

    h.scheduler.register(AlarmJob::from(&schedule));
    h.scheduler.cancel(schedule.id);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.notifier.attempts(), 0);
    assert!(!is_completed(&h.store, schedule.id).await);
    assert!(!h.scheduler.is_pending(schedule.id).await);
}

#[tokio::test(start_paused = true)]
async fn failed_dispatch_leaves_schedule_incomplete_and_unregistered() {
    let h = harness(Behaviour::Fail).await;
    let schedule = schedule_in(&h.store, chrono::Duration::seconds(2)).await;

    h.scheduler.register(AlarmJob::from(&schedule));
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(h.notifier.attempts(), 1);
    let stored = h.store.get(schedule.id).await.unwrap().unwrap();
    assert!(!stored.is_completed);
    assert!(stored.is_active);
    assert!(!h.scheduler.is_pending(schedule.id).await);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.notifier.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_register_replaces_first() {
    let h = harness(Behaviour::Deliver).await;
    let mut schedule = schedule_in(&h.store, chrono::Duration::seconds(30)).await;
    h.scheduler.register(AlarmJob::from(&schedule));

    schedule.scheduled_time = Utc::now() + chrono::Duration::seconds(2);
    let schedule = h.store.update(&schedule).await.unwrap().unwrap();
    h.scheduler.register(AlarmJob::from(&schedule));

    let pending = h.scheduler.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].scheduled_time, schedule.scheduled_time);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.notifier.attempts(), 1);
    assert!(is_completed(&h.store, schedule.id).await);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.notifier.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_unknown_or_fired_is_noop() {
    let h = harness(Behaviour::Deliver).await;
    h.scheduler.cancel(12345);

    let schedule = schedule_in(&h.store, chrono::Duration::seconds(1)).await;
    h.scheduler.register(AlarmJob::from(&schedule));
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.scheduler.cancel(schedule.id);

    assert!(h.scheduler.pending().await.is_empty());
    assert!(is_completed(&h.store, schedule.id).await);
}

#[tokio::test(start_paused = true)]
async fn past_due_alarm_fires_immediately() {
    let h = harness(Behaviour::Deliver).await;
    let schedule = schedule_in(&h.store, chrono::Duration::minutes(-5)).await;

    h.scheduler.register(AlarmJob::from(&schedule));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(is_completed(&h.store, schedule.id).await);
}

#[tokio::test]
async fn on_fire_tolerates_deleted_schedule() {
    let h = harness(Behaviour::Deliver).await;
    let schedule = schedule_in(&h.store, chrono::Duration::seconds(1)).await;
    let job = AlarmJob::from(&schedule);
    h.store.delete(schedule.id).await.unwrap();

    assert_eq!(h.dispatcher.on_fire(&job).await, FireOutcome::Missing);
    assert_eq!(h.notifier.attempts(), 0);
}

#[tokio::test]
async fn on_fire_skips_inactive_and_moved_schedules() {
    let h = harness(Behaviour::Deliver).await;
    let mut schedule = schedule_in(&h.store, chrono::Duration::seconds(1)).await;
    let original = AlarmJob::from(&schedule);

    schedule.scheduled_time = schedule.scheduled_time + chrono::Duration::hours(1);
    let moved = h.store.update(&schedule).await.unwrap().unwrap();
    assert_eq!(h.dispatcher.on_fire(&original).await, FireOutcome::Stale);

    let mut inactive = moved.clone();
    inactive.is_active = false;
    h.store.update(&inactive).await.unwrap();
    assert_eq!(
        h.dispatcher.on_fire(&AlarmJob::from(&moved)).await,
        FireOutcome::Skipped
    );
    assert_eq!(h.notifier.attempts(), 0);
}

#[tokio::test]
async fn on_fire_without_owner_does_not_dispatch() {
    let h = harness(Behaviour::Deliver).await;
    let orphan = h
        .store
        .create(NewSchedule {
            owner_id: 99,
            title: "orphan".into(),
            description: None,
            scheduled_time: Utc::now(),
        })
        .await
        .unwrap();

    assert_eq!(
        h.dispatcher.on_fire(&AlarmJob::from(&orphan)).await,
        FireOutcome::NoRecipient
    );
    assert_eq!(h.notifier.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_notifier_counts_as_failure() {
    let h = harness(Behaviour::Hang).await;
    let schedule = schedule_in(&h.store, chrono::Duration::seconds(1)).await;

    let outcome = h.dispatcher.on_fire(&AlarmJob::from(&schedule)).await;

    assert_eq!(outcome, FireOutcome::Failed);
    assert!(!is_completed(&h.store, schedule.id).await);
}

#[tokio::test(start_paused = true)]
async fn concurrent_fires_for_one_schedule_send_once() {
    let h = harness(Behaviour::Slow(Duration::from_millis(500))).await;
    let schedule = schedule_in(&h.store, chrono::Duration::seconds(1)).await;
    let job = AlarmJob::from(&schedule);

    let (first, second) = tokio::join!(h.dispatcher.on_fire(&job), h.dispatcher.on_fire(&job));

    let mut outcomes = vec![first, second];
    outcomes.sort_by_key(|outcome| *outcome == FireOutcome::Completed);
    assert_eq!(outcomes, vec![FireOutcome::AlreadyFiring, FireOutcome::Completed]);
    assert_eq!(h.notifier.attempts(), 1);

    // Once the first dispatch is done the record is complete.
    assert_eq!(h.dispatcher.on_fire(&job).await, FireOutcome::Skipped);
}

// Real clock: the registry deadline and the wall clock advance together here.
#[tokio::test]
async fn re_register_during_slow_dispatch_sends_once() {
    let h = harness(Behaviour::Slow(Duration::from_millis(500))).await;
    let schedule = schedule_in(&h.store, chrono::Duration::milliseconds(300)).await;
    h.scheduler.register(AlarmJob::from(&schedule));

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(h.notifier.attempts(), 1);
    assert!(!is_completed(&h.store, schedule.id).await);

    // Same time, already due: fires at once while the first send is still out.
    h.scheduler.register(AlarmJob::from(&schedule));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(h.notifier.attempts(), 1);
    assert!(is_completed(&h.store, schedule.id).await);
    assert!(h.scheduler.pending().await.is_empty());
}

#[tokio::test]
async fn cloned_handles_apply_commands_in_send_order() {
    let h = harness(Behaviour::Deliver).await;
    let schedule = schedule_in(&h.store, chrono::Duration::hours(1)).await;
    let at = |minutes: i64| {
        let mut job = AlarmJob::from(&schedule);
        job.scheduled_time = schedule.scheduled_time + chrono::Duration::minutes(minutes);
        job
    };

    let id = schedule.id;
    let mut tasks = Vec::new();
    for i in 0..16 {
        let scheduler = h.scheduler.clone();
        let job = at(i);
        tasks.push(tokio::spawn(async move {
            scheduler.register(job);
            if i % 2 == 0 {
                scheduler.cancel(id);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert!(h.scheduler.pending().await.len() <= 1);

    let (a, b) = (h.scheduler.clone(), h.scheduler.clone());
    a.register(at(1));
    b.cancel(schedule.id);
    assert!(!a.is_pending(schedule.id).await);

    b.register(at(2));
    a.register(at(3));
    let pending = b.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].scheduled_time, at(3).scheduled_time);

    a.cancel(schedule.id);
    b.register(at(4));
    let pending = a.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].scheduled_time, at(4).scheduled_time);
}
