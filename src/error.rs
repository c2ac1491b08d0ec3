// Error handling module
// Defines the client error taxonomy and user-facing messages

use thiserror::Error;

use crate::models::FieldError;

/// Errors surfaced to callers of the API client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport failure (connect, timeout, body)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Error status returned by the API
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Field-level validation errors returned by the API
    #[error("Validation failed: {}", join_field_errors(.0, "; "))]
    Validation(Vec<FieldError>),

    /// The refresh token was rejected; the session has been cleared
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// A refreshed token arrived after the session was ended
    #[error("Session ended while the access token was being refreshed")]
    SessionExpired,

    /// Operation requires a session and none is present
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The command was given unusable input; nothing was sent
    #[error("Invalid input: {0}")]
    Usage(String),

    /// Credential store failure
    #[error("Credential storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    /// Build a storage error from any error chain
    pub fn storage(err: anyhow::Error) -> Self {
        ClientError::Storage(format!("{:#}", err))
    }

    /// HTTP status of the failed response, if the server produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the caller is now logged out and should re-authenticate
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            ClientError::RefreshFailed(_) | ClientError::SessionExpired | ClientError::NotAuthenticated
        ) || matches!(self.status(), Some(401) | Some(403))
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Transport(e) if e.is_timeout() => {
                "The server took too long to respond".to_string()
            }
            ClientError::Transport(_) => "Server unreachable".to_string(),
            ClientError::Api { message, .. } => message.clone(),
            ClientError::Validation(errors) => join_field_errors(errors, "\n"),
            ClientError::RefreshFailed(_) | ClientError::SessionExpired => {
                "Your session has expired, please log in again".to_string()
            }
            ClientError::NotAuthenticated => {
                "Not logged in. Run `taskflow login` first".to_string()
            }
            ClientError::Usage(msg) => msg.clone(),
            ClientError::Storage(msg) => format!("Could not access stored credentials: {}", msg),
            ClientError::Internal(err) => format!("Something went wrong: {}", err),
        }
    }
}

fn join_field_errors(errors: &[FieldError], sep: &str) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ClientError::Api {
            status: 404,
            message: "Task not found".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 404 - Task not found");
        assert_eq!(err.user_message(), "Task not found");

        let err = ClientError::RefreshFailed("401 Unauthorized".to_string());
        assert_eq!(err.to_string(), "Token refresh failed: 401 Unauthorized");
    }

    #[test]
    fn test_validation_messages_are_verbatim() {
        let err = ClientError::Validation(vec![
            FieldError {
                field: Some("email".to_string()),
                message: "Invalid email".to_string(),
            },
            FieldError {
                field: None,
                message: "Password too short".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: email: Invalid email; Password too short"
        );
        assert_eq!(err.user_message(), "email: Invalid email\nPassword too short");
    }

    #[test]
    fn test_requires_login() {
        assert!(ClientError::SessionExpired.requires_login());
        assert!(ClientError::RefreshFailed("x".to_string()).requires_login());
        assert!(ClientError::Api {
            status: 401,
            message: "Unauthorized".to_string()
        }
        .requires_login());
        assert!(!ClientError::Api {
            status: 500,
            message: "Boom".to_string()
        }
        .requires_login());
    }

    #[test]
    fn test_storage_error_keeps_context() {
        let err = ClientError::storage(
            anyhow::anyhow!("disk full").context("Failed to write accessToken"),
        );
        assert_eq!(
            err.to_string(),
            "Credential storage error: Failed to write accessToken: disk full"
        );
    }

    #[test]
    fn test_usage_error_is_shown_as_is() {
        let err = ClientError::Usage("Nothing to update".to_string());
        assert_eq!(err.to_string(), "Invalid input: Nothing to update");
        assert_eq!(err.user_message(), "Nothing to update");
        assert!(!err.requires_login());
    }

    #[test]
    fn test_internal_error_message() {
        let err = ClientError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }
}
