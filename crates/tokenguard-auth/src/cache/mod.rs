//! In-process shared cache backend.
//!
//! Correct only when a single service instance owns all denylist and rate
//! limit state. Multi-instance deployments use the Redis backend from
//! `tokenguard-auth-redis`, which falls back to this one when Redis is
//! unreachable at startup.

pub mod local;

pub use local::LocalCache;
