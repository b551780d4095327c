mod handler;
mod model;

pub use handler::{google_auth, me, refresh_token, verify};
pub use model::{GoogleAuthRequest, TokenResponse, User, UserResponse, VerifyResponse};
