//! Error responses for the HTTP boundary.
//!
//! Every error is rendered as
//! `{"timestamp", "status", "errorCode", "message"}` with the status from
//! [`AuthError::http_status`]. Store and internal failures are logged and
//! reported with a generic message.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = public_message(&self);

        if self.is_server_error() {
            tracing::error!(
                error = %self,
                category = %self.category(),
                code = self.code(),
                "request failed"
            );
        }

        let body = error_body(status, self.code(), &message, None);

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(self.code(), &message);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, Json(body)).into_response()
    }
}

/// Builds the JSON error body. `path` is included when known.
#[must_use]
pub fn error_body(
    status: StatusCode,
    error_code: &str,
    message: &str,
    path: Option<&str>,
) -> serde_json::Value {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    let mut body = json!({
        "timestamp": timestamp,
        "status": status.as_u16(),
        "errorCode": error_code,
        "message": message,
    });
    if let Some(path) = path {
        body["path"] = json!(path);
    }
    body
}

fn public_message(error: &AuthError) -> String {
    match error {
        AuthError::AccountLocked {
            locked_until: Some(until),
        } => format!(
            "Account is locked until {}",
            until.format(&Rfc3339).unwrap_or_default()
        ),
        AuthError::TransientStoreError { .. } => "Service temporarily unavailable".to_string(),
        AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            "Internal server error".to_string()
        }
        other => other.to_string(),
    }
}

/// Format: `Bearer realm="tokenguard", error="...", error_description="..."`
fn build_www_authenticate_header(error: &str, description: &str) -> String {
    let escaped_desc = description.replace('"', "\\\"");
    format!(
        "Bearer realm=\"tokenguard\", error=\"{}\", error_description=\"{}\"",
        error, escaped_desc
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_credentials_response() {
        let response = AuthError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let www_auth = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(www_auth.contains("realm=\"tokenguard\""));
        assert!(www_auth.contains("AUTH_ERR_INVALID_CREDENTIALS"));

        let json = body_json(response).await;
        assert_eq!(json["status"], 401);
        assert_eq!(json["errorCode"], "AUTH_ERR_INVALID_CREDENTIALS");
        assert_eq!(json["message"], "Invalid credentials");
        assert!(json["timestamp"].is_string());
        assert!(json.get("path").is_none());
    }

    #[tokio::test]
    async fn test_locked_response() {
        let until = OffsetDateTime::now_utc();
        let response = AuthError::account_locked(Some(until)).into_response();
        assert_eq!(response.status(), StatusCode::LOCKED);
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));

        let json = body_json(response).await;
        assert_eq!(json["errorCode"], "AUTH_ERR_ACCOUNT_LOCKED");
        assert!(
            json["message"]
                .as_str()
                .unwrap()
                .starts_with("Account is locked until")
        );
    }

    #[tokio::test]
    async fn test_transient_error_hides_details() {
        let response = AuthError::transient("redis://10.0.0.5 refused").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json = body_json(response).await;
        assert_eq!(json["errorCode"], "AUTH_ERR_STORE_UNAVAILABLE");
        assert_eq!(json["message"], "Service temporarily unavailable");
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let response = AuthError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["errorCode"], "AUTH_ERR_RATE_LIMIT");
    }

    #[test]
    fn test_error_body_with_path() {
        let body = error_body(
            StatusCode::TOO_MANY_REQUESTS,
            "AUTH_ERR_RATE_LIMIT",
            "Too many requests",
            Some("/api/v1/auth/login"),
        );
        assert_eq!(body["status"], 429);
        assert_eq!(body["path"], "/api/v1/auth/login");
    }

    #[test]
    fn test_www_authenticate_header_escaping() {
        let header = build_www_authenticate_header("AUTH_ERR_MALFORMED_TOKEN", "bad \"token\"");
        assert!(header.contains("\\\"token\\\""));
    }
}
