use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use otters_backend::{
    AppState,
    auth::TokenService,
    config::Config,
    database, router,
    schedule::{Dispatcher, NotificationScheduler, PgScheduleStore, ScheduleStore, build_notifier},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration
    let config = Config::from_env().expect("Failed to load configuration");

    // Database pool and tables
    let pool = database::connect(&config)
        .await
        .expect("Failed to connect to Postgres");
    database::init_schema(&pool)
        .await
        .expect("Failed to create tables");

    // Alarm delivery
    let store: Arc<dyn ScheduleStore> = Arc::new(PgScheduleStore::new(pool.clone()));
    let notifier = build_notifier(&config).expect("Failed to set up notifier");
    tracing::info!("alarms dispatched via {} notifier", notifier.name());

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        notifier,
        config.dispatch_timeout(),
    ));
    let (scheduler, scheduler_task) =
        NotificationScheduler::start(dispatcher, config.dispatch_workers);

    // Outbound client for Google
    let http = reqwest::Client::builder()
        .timeout(config.outbound_timeout())
        .build()
        .expect("Failed to build HTTP client");

    // Application state
    let state = AppState {
        pool,
        tokens: Arc::new(TokenService::from_config(&config)),
        config: config.clone(),
        schedules: store,
        scheduler: scheduler.clone(),
        http,
    };

    let app = router::create_router(state);

    // Start the server
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .expect("Failed to start server");

    // Pending alarms are dropped on exit
    scheduler.shutdown();
    let _ = scheduler_task.await;
}
