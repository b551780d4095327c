use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use super::entity::Schedule;

/// What gets delivered when a schedule comes due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmJob {
    pub schedule_id: i64,
    pub owner_id: i64,
    pub title: String,
    pub body: String,
    pub scheduled_time: DateTime<Utc>,
}

impl From<&Schedule> for AlarmJob {
    fn from(schedule: &Schedule) -> Self {
        Self {
            schedule_id: schedule.id,
            owner_id: schedule.owner_id,
            title: schedule.title.clone(),
            body: schedule.description.clone().unwrap_or_default(),
            scheduled_time: schedule.scheduled_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAlarm {
    pub schedule_id: i64,
    pub scheduled_time: DateTime<Utc>,
}

type QueueKey = (Instant, u64);

struct Slot {
    key: QueueKey,
    job: AlarmJob,
}

/// Due-time ordered queue holding at most one timer per schedule id.
///
/// The sequence number breaks ties between equal instants so that
/// every queue key is unique.
#[derive(Default)]
pub struct TimerRegistry {
    queue: BTreeMap<QueueKey, i64>,
    slots: HashMap<i64, Slot>,
    next_seq: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `job` to fire at `due`, dropping any timer already held
    /// for the same schedule first. Returns the replaced job.
    pub fn install(&mut self, job: AlarmJob, due: Instant) -> Option<AlarmJob> {
        let replaced = self.remove(job.schedule_id);

        // Unique even when two jobs share a deadline
        let key = (due, self.next_seq);
        self.next_seq += 1;
        self.queue.insert(key, job.schedule_id);
        self.slots.insert(job.schedule_id, Slot { key, job });

        replaced
    }

    pub fn remove(&mut self, schedule_id: i64) -> Option<AlarmJob> {
        let slot = self.slots.remove(&schedule_id)?;
        self.queue.remove(&slot.key);
        Some(slot.job)
    }

    pub fn contains(&self, schedule_id: i64) -> bool {
        self.slots.contains_key(&schedule_id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.first_key_value().map(|((due, _), _)| *due)
    }

    /// Takes every job due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<AlarmJob> {
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let schedule_id = entry.remove();
            if let Some(slot) = self.slots.remove(&schedule_id) {
                due.push(slot.job);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn snapshot(&self) -> Vec<PendingAlarm> {
        self.queue
            .values()
            .filter_map(|id| self.slots.get(id))
            .map(|slot| PendingAlarm {
                schedule_id: slot.job.schedule_id,
                scheduled_time: slot.job.scheduled_time,
            })
            .collect()
    }
}
