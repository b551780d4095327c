use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    auth::{TokenKind, authenticate, bearer_token},
    error::AppError,
};

/// Lets the request through only with a valid bearer access token and
/// exposes the caller as `Extension<AuthUser>`.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
    let user = authenticate(&state.tokens, &token, TokenKind::Access)
        .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
