//! Client error types

use thiserror::Error;

/// Errors returned by [`crate::ApiClient`]
#[derive(Debug, Error)]
pub enum ClientError {
    /// The API answered with an error envelope
    #[error("API error ({status}, {error}): {message}")]
    Api {
        status: u16,
        error: String,
        message: String,
    },

    /// The access token was rejected and could not be refreshed
    #[error("Session expired, sign in again")]
    SessionExpired,

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A successful response did not carry the expected payload
    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Token store error: {0}")]
    Store(String),
}

impl ClientError {
    /// HTTP status of an API error, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_api_errors() {
        let err = ClientError::Api {
            status: 404,
            error: "not_found".to_string(),
            message: "Task not found".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.to_string(),
            "API error (404, not_found): Task not found"
        );

        assert_eq!(ClientError::SessionExpired.status(), None);
    }
}
