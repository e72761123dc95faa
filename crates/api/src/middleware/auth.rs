//! JWT-based authentication extractor for Axum handlers.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use jollyboard_core::collaboration::{clamp_user_name, validate_id};
use jollyboard_core::error::CoreError;
use jollyboard_core::types::UserId;
use serde::Deserialize;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated participant taken from a Bearer token.
///
/// The token is read from the `Authorization` header, or from a `token` query
/// parameter for WebSocket upgrades where browsers cannot set headers.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn unauthorized(msg: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(msg.into()))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
        {
            Some(header) => header
                .strip_prefix("Bearer ")
                .ok_or_else(|| {
                    unauthorized("Invalid Authorization format. Expected: Bearer <token>")
                })?
                .to_string(),
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|q| q.0.token)
                .ok_or_else(|| unauthorized("Missing Authorization header"))?,
        };

        let claims = validate_token(&token, &state.config.jwt)
            .map_err(|_| unauthorized("Invalid or expired token"))?;
        validate_id("userId", &claims.sub).map_err(|_| unauthorized("Invalid token subject"))?;

        let user_name = if claims.name.trim().is_empty() {
            claims.sub.clone()
        } else {
            clamp_user_name(&claims.name)
        };

        Ok(AuthUser {
            user_id: claims.sub,
            user_name,
        })
    }
}
