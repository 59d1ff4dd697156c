use crate::repositories::errors::RepositoryError;
use std::fmt;

#[derive(Debug)]
pub enum AuthServiceError {
    InvalidToken,
    ExpiredToken,
    MissingToken,
    UnknownAccount,
    InvalidGuestName(String),
    JwtError(String),
    RepositoryError(RepositoryError),
}

impl fmt::Display for AuthServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthServiceError::InvalidToken => write!(f, "Invalid JWT token"),
            AuthServiceError::ExpiredToken => write!(f, "JWT token has expired"),
            AuthServiceError::MissingToken => write!(f, "No token provided"),
            AuthServiceError::UnknownAccount => write!(f, "Account does not exist"),
            AuthServiceError::InvalidGuestName(msg) => write!(f, "Invalid guest name: {}", msg),
            AuthServiceError::JwtError(msg) => write!(f, "JWT error: {}", msg),
            AuthServiceError::RepositoryError(err) => write!(f, "Repository error: {}", err),
        }
    }
}

impl std::error::Error for AuthServiceError {}

impl From<RepositoryError> for AuthServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => AuthServiceError::UnknownAccount,
            other => AuthServiceError::RepositoryError(other),
        }
    }
}
