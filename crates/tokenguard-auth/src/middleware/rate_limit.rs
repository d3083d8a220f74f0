//! Rate limiting middleware for authentication routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateLimitingConfig;
use crate::error::AuthError;
use crate::rate_limit::{DENIED, RateLimitRules, RateLimiter, UNKNOWN_CLIENT, client_key};

use super::error::error_body;

/// Header carrying the remaining request count on allowed responses.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// State for [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    limiter: RateLimiter,
    rules: Arc<RateLimitRules>,
    enabled: bool,
}

impl RateLimitState {
    /// Creates middleware state from a limiter and configuration.
    #[must_use]
    pub fn new(limiter: RateLimiter, config: &RateLimitingConfig) -> Self {
        Self {
            limiter,
            rules: Arc::new(RateLimitRules::from_config(config)),
            enabled: config.enabled,
        }
    }
}

/// Applies per-route limits to requests under the configured prefix.
///
/// Allowed responses carry `X-RateLimit-Remaining`. Denied requests get
/// 429 with the standard error body plus `path`. A cache failure yields 503.
///
/// Clients are keyed by the first `X-Forwarded-For` entry, else the peer
/// address. The peer address is only available when the router is served
/// with `into_make_service_with_connect_info::<SocketAddr>()`; without it
/// and without a forwarding proxy, all callers share the `unknown` bucket
/// and a warning is logged.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().as_str().to_string();

    let rule = match state.rules.rule_for(&method, &path) {
        Some(rule) if state.enabled => rule,
        _ => return next.run(request).await,
    };

    let forwarded_for = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let key = client_key(forwarded_for, remote_addr.as_deref(), &method, &path);
    if key.starts_with(UNKNOWN_CLIENT) && remote_addr.is_none() {
        tracing::warn!(
            path = %path,
            "no client address for rate limiting; serve with connect info or behind a proxy"
        );
    }

    let remaining = match state.limiter.try_consume_rule(&key, rule).await {
        Ok(remaining) => remaining,
        Err(e) => return e.into_response(),
    };

    if remaining == DENIED {
        tracing::warn!(key = %key, limit = rule.limit, "request rate limited");
        let error = AuthError::RateLimited;
        let body = error_body(
            StatusCode::TOO_MANY_REQUESTS,
            error.code(),
            &error.to_string(),
            Some(&path),
        );
        return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(REMAINING_HEADER, HeaderValue::from(remaining));
    response
}
