use axum::{
    Json,
    extract::{Extension, Path, State},
};

use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    schedule::{AlarmJob, Schedule, ScheduleChanges},
    utils::{ApiResponse, success_to_api_response},
};

use super::model::{CreateScheduleRequest, DeleteScheduleResponse, validate_title};

/// Keeps the pending alarm in line with an edited record.
///
/// Edits that neither move the alarm nor re-enable it leave the scheduler
/// alone, so an alarm that already fired is not queued a second time.
fn sync_alarm(state: &AppState, previous: &Schedule, updated: &Schedule) {
    if !updated.wants_alarm() {
        state.scheduler.cancel(updated.id);
    } else if updated.needs_rearm(previous) {
        state.scheduler.register(AlarmJob::from(updated));
    }
}

#[axum::debug_handler]
pub async fn create_schedule(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<Json<ApiResponse<Schedule>>, AppError> {
    let new = req.into_new_schedule(user.user_id)?;
    let schedule = state.schedules.create(new).await?;
    state.scheduler.register(AlarmJob::from(&schedule));

    tracing::info!(
        "user {} scheduled {} for {}",
        user.user_id,
        schedule.id,
        schedule.scheduled_time
    );
    Ok(success_to_api_response(schedule))
}

#[axum::debug_handler]
pub async fn list_schedules(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Schedule>>>, AppError> {
    let schedules = state.schedules.list_by_owner(user.user_id).await?;
    Ok(success_to_api_response(schedules))
}

#[axum::debug_handler]
pub async fn update_schedule(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(schedule_id): Path<i64>,
    Json(changes): Json<ScheduleChanges>,
) -> Result<Json<ApiResponse<Schedule>>, AppError> {
    if let Some(title) = &changes.title {
        validate_title(title)?;
    }

    // Non-owners get the same answer as a missing id.
    let previous = state
        .schedules
        .find_owned(schedule_id, user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let mut schedule = previous.clone();
    schedule.apply(changes);

    let updated = state
        .schedules
        .update(&schedule)
        .await?
        .ok_or(AppError::NotFound)?;
    sync_alarm(&state, &previous, &updated);

    Ok(success_to_api_response(updated))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(schedule_id): Path<i64>,
) -> Result<Json<ApiResponse<DeleteScheduleResponse>>, AppError> {
    state
        .schedules
        .find_owned(schedule_id, user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    // Cancel first so the timer cannot fire on a row about to disappear.
    state.scheduler.cancel(schedule_id);
    state.schedules.delete(schedule_id).await?;

    Ok(success_to_api_response(DeleteScheduleResponse {
        message: "Schedule deleted successfully".into(),
    }))
}
