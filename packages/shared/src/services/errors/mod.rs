pub mod auth_service_errors;
pub mod chess_service_errors;
pub mod session_errors;

pub use auth_service_errors::AuthServiceError;
pub use chess_service_errors::ChessServiceError;
pub use session_errors::SessionError;
