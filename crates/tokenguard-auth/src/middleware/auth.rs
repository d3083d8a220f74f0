//! Bearer token authentication extractor.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AuthError;
use crate::session::SessionService;
use crate::token::AccessTokenClaims;

/// Axum extractor that validates `Authorization: Bearer <token>`.
///
/// The token goes through signature and expiry verification, then the
/// denylist. Rejections render through `IntoResponse for AuthError`.
///
/// The application state must expose a [`SessionService`] via `FromRef`.
pub struct BearerAuth(pub AccessTokenClaims);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    SessionService: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let sessions = SessionService::from_ref(state);

        let claims = sessions.authenticate(token).await.map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            e
        })?;
        Ok(BearerAuth(claims))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AuthError::malformed_token("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AuthError::malformed_token("Authorization header is not valid ASCII"))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::malformed_token("Expected a Bearer token"))
}
