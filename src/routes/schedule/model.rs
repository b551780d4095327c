use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::schedule::NewSchedule;

pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub title: String,
    pub description: Option<String>,
    pub scheduled_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeleteScheduleResponse {
    pub message: String,
}

pub fn validate_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

impl CreateScheduleRequest {
    pub fn into_new_schedule(self, owner_id: i64) -> Result<NewSchedule, AppError> {
        validate_title(&self.title)?;
        Ok(NewSchedule {
            owner_id,
            title: self.title,
            description: self.description,
            scheduled_time: self.scheduled_time,
        })
    }
}
