#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryError {
    NotFound,
    Serialization(String),
    DynamoDb(String),
    Unavailable(String),
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::NotFound => write!(f, "Item not found"),
            RepositoryError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            RepositoryError::DynamoDb(msg) => write!(f, "DynamoDB error: {}", msg),
            RepositoryError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for RepositoryError {}
