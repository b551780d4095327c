use config::Config;
use sqlx::PgPool;
use std::sync::Arc;

use auth::TokenService;
use schedule::{NotificationScheduler, ScheduleStore};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod schedule;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub tokens: Arc<TokenService>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub scheduler: NotificationScheduler,
    pub http: reqwest::Client,
}
