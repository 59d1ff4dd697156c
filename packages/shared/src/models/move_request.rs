use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub from_square: String,             // e.g., "e2"
    pub to_square: String,               // e.g., "e4"
    pub promotion_piece: Option<String>, // e.g., "q" for queen
}

impl MoveRequest {
    pub fn new(from_square: &str, to_square: &str) -> Self {
        MoveRequest {
            from_square: from_square.to_string(),
            to_square: to_square.to_string(),
            promotion_piece: None,
        }
    }

    pub fn with_promotion(from_square: &str, to_square: &str, promotion_piece: &str) -> Self {
        MoveRequest {
            from_square: from_square.to_string(),
            to_square: to_square.to_string(),
            promotion_piece: Some(promotion_piece.to_string()),
        }
    }

    /// Parses a UCI string such as `e2e4` or `e7e8q`.
    pub fn from_uci(uci: &str) -> Option<Self> {
        if !uci.is_ascii() || !(uci.len() == 4 || uci.len() == 5) {
            return None;
        }
        let promotion = uci.get(4..5).map(str::to_string);
        Some(MoveRequest {
            from_square: uci[0..2].to_string(),
            to_square: uci[2..4].to_string(),
            promotion_piece: promotion,
        })
    }

    pub fn to_uci(&self) -> String {
        format!(
            "{}{}{}",
            self.from_square,
            self.to_square,
            self.promotion_piece.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_uci() {
        assert_eq!(MoveRequest::from_uci("e2e4"), Some(MoveRequest::new("e2", "e4")));
        assert_eq!(
            MoveRequest::from_uci("a7a8q"),
            Some(MoveRequest::with_promotion("a7", "a8", "q"))
        );
        assert_eq!(MoveRequest::from_uci("e2"), None);
    }

    #[test]
    fn test_to_uci() {
        assert_eq!(MoveRequest::with_promotion("b7", "b8", "n").to_uci(), "b7b8n");
    }
}
