//! Middleware for the API server
//!
//! - `security`: helmet-style response headers
//! - `rate_limit`: per-client token bucket
//! - `logging`: access log line with the authenticated caller

pub mod logging;
pub mod rate_limit;
pub mod security;
