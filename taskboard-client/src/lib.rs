//! # Taskboard Client
//!
//! HTTP client for the Taskboard API. Responses are unwrapped from the
//! `{success, data, message}` envelope into the shared model types, and an
//! expired access token is renewed at the identity provider transparently.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskboard_client::{ApiClient, ClientConfig, MemoryTokenStore, Tokens};
//!
//! # async fn example() -> Result<(), taskboard_client::ClientError> {
//! let store = Arc::new(MemoryTokenStore::with_tokens(Tokens::new(
//!     "access-token",
//!     Some("refresh-token".to_string()),
//! )));
//! let client = ApiClient::new(
//!     ClientConfig::new("http://localhost:3001", "http://localhost:8080"),
//!     store,
//! )
//! .await?;
//!
//! for project in client.projects().await? {
//!     println!("{} ({} tasks)", project.name, project.tasks.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod session;

pub use client::{ApiClient, ClientConfig, HealthStatus, UsersQuery};
pub use error::{ClientError, ClientResult};
pub use session::{MemoryTokenStore, TokenStore, Tokens};
