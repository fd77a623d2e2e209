//! # Taskboard API Server Library
//!
//! Role-gated project and task management over HTTP. Access tokens come
//! from an external identity provider and are verified against its JWKS.
//!
//! ## Modules
//!
//! - `app`: Application state, router builder and the auth layer
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Extractors with enveloped rejections
//! - `middleware`: Security headers, rate limiting, access log
//! - `response`: Success envelope
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod response;
pub mod routes;
