mod handler;
mod model;

pub use handler::{create_schedule, delete_schedule, list_schedules, update_schedule};
pub use model::{CreateScheduleRequest, DeleteScheduleResponse, MAX_TITLE_LEN};
