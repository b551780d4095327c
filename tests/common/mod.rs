#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use otters_backend::{
    AppState,
    auth::{TokenKind, TokenService},
    config::Config,
    router::create_router,
    schedule::{Dispatcher, LogNotifier, MemoryScheduleStore, NotificationScheduler, Notifier},
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

pub const SECRET: &str = "integration-secret";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryScheduleStore>,
}

/// Application wired to an in-memory schedule store. The Postgres pool is
/// lazy and never connects unless a user-table route is exercised.
pub fn test_app_with(config: Config) -> TestApp {
    test_app_with_notifier(config, Arc::new(LogNotifier))
}

pub fn test_app_with_notifier(config: Config, notifier: Arc<dyn Notifier>) -> TestApp {
    let store = Arc::new(MemoryScheduleStore::new());
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        notifier,
        Duration::from_secs(5),
    ));
    let (scheduler, _task) = NotificationScheduler::start(dispatcher, 2);

    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .expect("lazy pool");
    let http = reqwest::Client::builder()
        .timeout(config.outbound_timeout())
        .build()
        .expect("http client");

    let state = AppState {
        pool,
        tokens: Arc::new(TokenService::from_config(&config)),
        config,
        schedules: store.clone(),
        scheduler,
        http,
    };

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
    }
}

pub fn test_app() -> TestApp {
    test_app_with(Config::for_tests(SECRET))
}

pub fn token_for(app: &TestApp, user_id: i64, kind: TokenKind) -> String {
    app.state
        .tokens
        .issue(&user_id.to_string(), kind)
        .expect("issue token")
        .token
}

pub async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
