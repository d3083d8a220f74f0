//! HTTP boundary helpers for axum.
//!
//! - [`rate_limit_middleware`] - per-client fixed-window limits on auth routes
//! - [`BearerAuth`] - `Authorization: Bearer` extractor backed by [`SessionService`](crate::session::SessionService)
//! - `IntoResponse` for [`AuthError`](crate::error::AuthError) with stable error codes
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::{get, post}};
//! use tokenguard_auth::middleware::{BearerAuth, RateLimitState, rate_limit_middleware};
//!
//! async fn me(BearerAuth(claims): BearerAuth) -> String {
//!     claims.preferred_username
//! }
//!
//! let app = Router::new()
//!     .route("/api/v1/me", get(me))
//!     .route("/api/v1/auth/login", post(login))
//!     .layer(middleware::from_fn_with_state(rate_state, rate_limit_middleware))
//!     .with_state(sessions);
//! ```

pub mod auth;
pub mod error;
pub mod rate_limit;

pub use auth::BearerAuth;
pub use error::error_body;
pub use rate_limit::{RateLimitState, rate_limit_middleware};
