//! API authentication via bearer session tokens.
//!
//! Tokens are opaque random strings stored in the `sessions` table. The
//! middleware resolves `Authorization: Bearer <token>` to the caller's
//! [`Entitlement`] and makes it available to handlers as an extension.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::Rng;
use uuid::Uuid;

use hatch_core::error::HatchError;
use hatch_core::types::Entitlement;
use hatch_storage::SessionRepository;

use crate::error::ApiError;
use crate::state::AppState;

/// Generate a random 64-character hex token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Create and store a new session token for `user_id`.
pub fn issue_token(sessions: &SessionRepository, user_id: Uuid) -> Result<String, HatchError> {
    let token = generate_token();
    sessions.insert(&token, user_id)?;
    tracing::info!(user_id = %user_id, "Session token issued");
    Ok(token)
}

/// The bearer credential from an `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get("authorization")
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header encoding".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Invalid bearer token".to_string()))
}

/// Middleware that validates bearer-token authentication.
///
/// Resolves the token against the session store and inserts the caller's
/// [`Entitlement`] into request extensions. Returns 401 if the header is
/// missing or the token is unknown.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let resolved = bearer_token(req.headers()).and_then(|token| {
        state
            .sessions()
            .resolve(token)
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::Unauthorized("Invalid bearer token".to_string()))
    });

    match resolved {
        Ok(entitlement) => {
            req.extensions_mut().insert::<Entitlement>(entitlement);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}
