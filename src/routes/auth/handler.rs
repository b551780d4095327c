use axum::{
    Json,
    extract::{Extension, Query, State},
    http::HeaderMap,
};

use crate::{
    AppState,
    auth::{AuthUser, TokenKind, authenticate, bearer_token},
    error::AppError,
    utils::{ApiResponse, success_to_api_response},
};

use super::model::{
    GoogleAuthRequest, GoogleUserInfo, TokenResponse, User, UserResponse, VerifyQuery,
    VerifyResponse,
};

async fn fetch_google_user(state: &AppState, access_token: &str) -> Result<GoogleUserInfo, AppError> {
    let response = state
        .http
        .get(&state.config.google_userinfo_url)
        .query(&[("access_token", access_token)])
        .send()
        .await
        .map_err(|e| {
            tracing::warn!("google userinfo request failed: {}", e);
            AppError::Upstream("Google userinfo request failed".into())
        })?;

    if !response.status().is_success() {
        tracing::info!("google rejected access token with status {}", response.status());
        return Err(AppError::Unauthorized);
    }

    response.json::<GoogleUserInfo>().await.map_err(|e| {
        tracing::warn!("unreadable google userinfo payload: {}", e);
        AppError::Upstream("Unexpected Google userinfo payload".into())
    })
}

/// Exchanges a Google OAuth access token for our own token pair.
#[axum::debug_handler]
pub async fn google_auth(
    State(state): State<AppState>,
    Json(req): Json<GoogleAuthRequest>,
) -> Result<Json<ApiResponse<TokenResponse>>, AppError> {
    if req.access_token.trim().is_empty() {
        return Err(AppError::Validation("access_token is required".into()));
    }

    let profile = fetch_google_user(&state, &req.access_token)
        .await?
        .into_profile()
        .ok_or_else(|| AppError::Validation("Missing required user information".into()))?;

    let user = User::upsert_google(&state.pool, &profile).await?;
    let pair = state.tokens.issue_pair(&user.id.to_string())?;

    Ok(success_to_api_response(TokenResponse::new(
        pair,
        Some(user.into()),
    )))
}

/// Mints a fresh access token from a bearer refresh token.
#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<TokenResponse>>, AppError> {
    let refresh = bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    let user = authenticate(&state.tokens, &refresh, TokenKind::Refresh)
        .ok_or(AppError::Unauthorized)?;

    let access = state
        .tokens
        .issue(&user.user_id.to_string(), TokenKind::Access)?;

    Ok(success_to_api_response(TokenResponse {
        access_token: access.token,
        refresh_token: refresh,
        token_type: "bearer",
        expires_in: state.tokens.ttl(TokenKind::Access).num_seconds(),
        user_info: None,
    }))
}

#[axum::debug_handler]
pub async fn me(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<UserResponse>>, AppError> {
    let user = User::find_by_id(&state.pool, user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(success_to_api_response(user.into()))
}

#[axum::debug_handler]
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<ApiResponse<VerifyResponse>>, AppError> {
    let caller = authenticate(&state.tokens, &query.token, TokenKind::Access)
        .ok_or(AppError::Unauthorized)?;
    let user = User::find_by_id(&state.pool, caller.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(success_to_api_response(VerifyResponse {
        valid: true,
        user: user.into(),
    }))
}
