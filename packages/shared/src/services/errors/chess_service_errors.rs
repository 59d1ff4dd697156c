#[derive(Debug, Clone, PartialEq)]
pub enum ChessServiceError {
    InvalidPosition(String),
    InvalidSquare(String),
    IllegalMove(String),
    GameOver(String),
}

impl std::fmt::Display for ChessServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChessServiceError::InvalidPosition(msg) => write!(f, "Invalid position: {}", msg),
            ChessServiceError::InvalidSquare(msg) => write!(f, "Invalid square: {}", msg),
            ChessServiceError::IllegalMove(msg) => write!(f, "Illegal move: {}", msg),
            ChessServiceError::GameOver(msg) => write!(f, "Game over: {}", msg),
        }
    }
}

impl std::error::Error for ChessServiceError {}
