mod token;

use axum::http::HeaderMap;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

pub use token::{Claims, IssuedToken, TokenError, TokenKind, TokenPair, TokenService};

/// Identity of the caller, put into request extensions by the auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

/// Verifies `token` as `kind` and parses the subject as a numeric user id.
pub fn authenticate(
    tokens: &TokenService,
    token: &str,
    kind: TokenKind,
) -> Option<AuthUser> {
    let subject = tokens
        .verify(token, kind)
        .inspect_err(|err| tracing::debug!("rejected {:?} token: {}", kind, err))
        .ok()?;

    subject.parse().ok().map(|user_id| AuthUser { user_id })
}
