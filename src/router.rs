use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post, put},
};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

use crate::{
    AppState,
    middleware::{auth_middleware, log_errors},
    routes,
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .inspect_err(|_| tracing::warn!("ignoring invalid CORS origin {}", origin))
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Builds the full application: public auth routes, bearer-protected
/// schedule routes, error logging and CORS.
pub fn create_router(state: AppState) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/auth/google", post(routes::auth::google_auth))
        .route("/auth/refresh", post(routes::auth::refresh_token))
        .route("/auth/verify", get(routes::auth::verify));

    // Routes that need an access token
    let protected_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route(
            "/schedule",
            post(routes::schedule::create_schedule).get(routes::schedule::list_schedules),
        )
        .route(
            "/schedule/{schedule_id}",
            put(routes::schedule::update_schedule).delete(routes::schedule::delete_schedule),
        )
        // Apply the auth middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Base routes, API nested under the configured prefix
    let router = Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health))
        .nest(
            &state.config.api_base_uri,
            Router::new().merge(public_routes).merge(protected_routes),
        )
        .layer(axum::middleware::from_fn(log_errors));

    // CORS depends on build mode
    let cors = if cfg!(debug_assertions) {
        tracing::debug!("debug build: permissive CORS");
        CorsLayer::permissive()
    } else {
        cors_layer(&state.config.allowed_origins)
    };

    router.layer(cors).with_state(state)
}
