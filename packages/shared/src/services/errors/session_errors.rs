use crate::repositories::errors::RepositoryError;
use crate::services::errors::auth_service_errors::AuthServiceError;
use crate::services::errors::chess_service_errors::ChessServiceError;

/// Errors surfaced by the orchestrator. Everything except `RateLimited`,
/// `ExternalService` and `Persistence` is reported to the offending
/// connection only; those three are absorbed locally.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    Authentication(String),
    Validation(String),
    StateConflict(String),
    NotFound(String),
    RateLimited,
    ExternalService(String),
    Persistence(String),
}

impl SessionError {
    /// Stable code carried by the wire `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Authentication(_) => "authentication_error",
            SessionError::Validation(_) => "validation_error",
            SessionError::StateConflict(_) => "state_conflict",
            SessionError::NotFound(_) => "not_found",
            SessionError::RateLimited => "rate_limited",
            SessionError::ExternalService(_) => "external_service_failure",
            SessionError::Persistence(_) => "persistence_failure",
        }
    }

    pub fn message(&self) -> String {
        match self {
            SessionError::Authentication(msg)
            | SessionError::Validation(msg)
            | SessionError::StateConflict(msg)
            | SessionError::NotFound(msg)
            | SessionError::ExternalService(msg)
            | SessionError::Persistence(msg) => msg.clone(),
            SessionError::RateLimited => "Too many moves".to_string(),
        }
    }

    pub fn room_not_found(room_id: &str) -> Self {
        SessionError::NotFound(format!("Room {} not found", room_id))
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Authentication(msg) => write!(f, "Authentication error: {}", msg),
            SessionError::Validation(msg) => write!(f, "Validation error: {}", msg),
            SessionError::StateConflict(msg) => write!(f, "State conflict: {}", msg),
            SessionError::NotFound(msg) => write!(f, "Not found: {}", msg),
            SessionError::RateLimited => write!(f, "Rate limited"),
            SessionError::ExternalService(msg) => write!(f, "External service failure: {}", msg),
            SessionError::Persistence(msg) => write!(f, "Persistence failure: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ChessServiceError> for SessionError {
    fn from(err: ChessServiceError) -> Self {
        SessionError::Validation(err.to_string())
    }
}

impl From<AuthServiceError> for SessionError {
    fn from(err: AuthServiceError) -> Self {
        match err {
            AuthServiceError::RepositoryError(inner) => SessionError::Persistence(inner.to_string()),
            other => SessionError::Authentication(other.to_string()),
        }
    }
}

impl From<RepositoryError> for SessionError {
    fn from(err: RepositoryError) -> Self {
        SessionError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(SessionError::Validation("x".into()).code(), "validation_error");
        assert_eq!(SessionError::StateConflict("x".into()).code(), "state_conflict");
        assert_eq!(SessionError::RateLimited.code(), "rate_limited");
    }

    #[test]
    fn test_chess_errors_become_validation_errors() {
        let err: SessionError = ChessServiceError::IllegalMove("e2e5".into()).into();
        assert!(matches!(err, SessionError::Validation(_)));
    }

    #[test]
    fn test_auth_errors_become_authentication_errors() {
        let err: SessionError = AuthServiceError::ExpiredToken.into();
        assert_eq!(err, SessionError::Authentication("JWT token has expired".into()));
    }
}
