use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Schedule {
    pub id: i64,
    #[serde(skip_serializing)]
    #[sqlx(rename = "user_id")]
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub is_completed: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_time: DateTime<Utc>,
}

/// Partial update sent by the owner; absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub is_completed: Option<bool>,
    pub is_active: Option<bool>,
}

impl Schedule {
    pub fn apply(&mut self, changes: ScheduleChanges) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(description) = changes.description {
            self.description = Some(description);
        }
        if let Some(scheduled_time) = changes.scheduled_time {
            self.scheduled_time = scheduled_time;
        }
        if let Some(is_completed) = changes.is_completed {
            self.is_completed = is_completed;
        }
        if let Some(is_active) = changes.is_active {
            self.is_active = is_active;
        }
    }

    /// Whether a pending alarm should exist for this record.
    pub fn wants_alarm(&self) -> bool {
        self.is_active && !self.is_completed
    }

    /// Whether an edit from `previous` to `self` needs a fresh timer: the
    /// alarm moved, or the record just started wanting one. Other edits
    /// keep the timer (or the in-flight dispatch) that already exists.
    pub fn needs_rearm(&self, previous: &Schedule) -> bool {
        self.wants_alarm()
            && (self.scheduled_time != previous.scheduled_time || !previous.wants_alarm())
    }
}
