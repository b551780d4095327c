use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tokio::sync::Mutex;

use super::entity::{NewSchedule, Schedule};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Where an alarm for a given owner is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Recipient {
    pub user_id: i64,
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create(&self, new: NewSchedule) -> Result<Schedule, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Schedule>, StoreError>;

    /// Persists every mutable field of `schedule`. `None` if the row is gone.
    async fn update(&self, schedule: &Schedule) -> Result<Option<Schedule>, StoreError>;

    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Owner's schedules, earliest `scheduled_time` first.
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Schedule>, StoreError>;

    /// Flips `is_completed` to true. `false` if the row is gone or already complete.
    async fn mark_completed(&self, id: i64) -> Result<bool, StoreError>;

    async fn recipient(&self, owner_id: i64) -> Result<Option<Recipient>, StoreError>;

    /// Looks up a schedule as seen by `owner_id`; other owners' rows read as missing.
    async fn find_owned(&self, id: i64, owner_id: i64) -> Result<Option<Schedule>, StoreError> {
        Ok(self.get(id).await?.filter(|s| s.owner_id == owner_id))
    }
}

const SCHEDULE_COLUMNS: &str =
    "id, user_id, title, description, scheduled_time, is_completed, is_active, created_at";

pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn create(&self, new: NewSchedule) -> Result<Schedule, StoreError> {
        let sql = format!(
            "INSERT INTO schedules (user_id, title, description, scheduled_time) \
             VALUES ($1, $2, $3, $4) RETURNING {SCHEDULE_COLUMNS}"
        );
        let schedule = sqlx::query_as::<_, Schedule>(&sql)
            .bind(new.owner_id)
            .bind(new.title)
            .bind(new.description)
            .bind(new.scheduled_time)
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!("created schedule {} for user {}", schedule.id, schedule.owner_id);
        Ok(schedule)
    }

    async fn get(&self, id: i64) -> Result<Option<Schedule>, StoreError> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1");
        Ok(sqlx::query_as::<_, Schedule>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update(&self, schedule: &Schedule) -> Result<Option<Schedule>, StoreError> {
        let sql = format!(
            "UPDATE schedules \
             SET title = $2, description = $3, scheduled_time = $4, is_completed = $5, is_active = $6 \
             WHERE id = $1 RETURNING {SCHEDULE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Schedule>(&sql)
            .bind(schedule.id)
            .bind(&schedule.title)
            .bind(&schedule.description)
            .bind(schedule.scheduled_time)
            .bind(schedule.is_completed)
            .bind(schedule.is_active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Schedule>, StoreError> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE user_id = $1 ORDER BY scheduled_time ASC"
        );
        Ok(sqlx::query_as::<_, Schedule>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn mark_completed(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE schedules SET is_completed = TRUE WHERE id = $1 AND is_completed = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recipient(&self, owner_id: i64) -> Result<Option<Recipient>, StoreError> {
        Ok(sqlx::query_as::<_, Recipient>(
            "SELECT id AS user_id, email, name FROM users WHERE id = $1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[derive(Default)]
struct MemoryTables {
    last_id: i64,
    schedules: BTreeMap<i64, Schedule>,
    recipients: HashMap<i64, Recipient>,
}

/// Process-local store used by tests and database-less local runs.
#[derive(Default)]
pub struct MemoryScheduleStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_recipient(&self, recipient: Recipient) {
        self.tables
            .lock()
            .await
            .recipients
            .insert(recipient.user_id, recipient);
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn create(&self, new: NewSchedule) -> Result<Schedule, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.last_id += 1;
        let schedule = Schedule {
            id: tables.last_id,
            owner_id: new.owner_id,
            title: new.title,
            description: new.description,
            scheduled_time: new.scheduled_time,
            is_completed: false,
            is_active: true,
            created_at: Utc::now(),
        };
        tables.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn get(&self, id: i64) -> Result<Option<Schedule>, StoreError> {
        Ok(self.tables.lock().await.schedules.get(&id).cloned())
    }

    async fn update(&self, schedule: &Schedule) -> Result<Option<Schedule>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(stored) = tables.schedules.get_mut(&schedule.id) else {
            return Ok(None);
        };
        stored.title = schedule.title.clone();
        stored.description = schedule.description.clone();
        stored.scheduled_time = schedule.scheduled_time;
        stored.is_completed = schedule.is_completed;
        stored.is_active = schedule.is_active;
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.schedules.remove(&id).is_some())
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Schedule>, StoreError> {
        let tables = self.tables.lock().await;
        let mut owned: Vec<Schedule> = tables
            .schedules
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by_key(|s| s.scheduled_time);
        Ok(owned)
    }

    async fn mark_completed(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.schedules.get_mut(&id) {
            Some(schedule) if !schedule.is_completed => {
                schedule.is_completed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn recipient(&self, owner_id: i64) -> Result<Option<Recipient>, StoreError> {
        Ok(self.tables.lock().await.recipients.get(&owner_id).cloned())
    }
}
