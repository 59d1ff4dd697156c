use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::move_request::MoveRequest;
use crate::services::chess_service::ChessService;
use crate::services::errors::SessionError;

#[cfg(test)]
use mockall::automock;

pub const DEFAULT_DIFFICULTY: u8 = 5;
pub const MAX_DIFFICULTY: u8 = 10;

/// External engine that proposes a move in UCI notation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MoveSuggester: Send + Sync {
    async fn suggest(&self, fen: &str, difficulty: u8) -> Result<String, SessionError>;
}

#[derive(Serialize)]
struct SuggestionRequest<'a> {
    fen: &'a str,
    difficulty: u8,
}

#[derive(Deserialize)]
struct SuggestionResponse {
    #[serde(rename = "move")]
    best_move: String,
}

pub struct HttpMoveSuggester {
    client: reqwest::Client,
    url: String,
}

impl HttpMoveSuggester {
    pub fn new(url: &str) -> Self {
        HttpMoveSuggester {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl MoveSuggester for HttpMoveSuggester {
    async fn suggest(&self, fen: &str, difficulty: u8) -> Result<String, SessionError> {
        let response = self
            .client
            .post(&self.url)
            .json(&SuggestionRequest { fen, difficulty })
            .send()
            .await
            .map_err(|e| SessionError::ExternalService(e.to_string()))?
            .error_for_status()
            .map_err(|e| SessionError::ExternalService(e.to_string()))?;

        let body: SuggestionResponse = response
            .json()
            .await
            .map_err(|e| SessionError::ExternalService(e.to_string()))?;
        Ok(body.best_move)
    }
}

/// Picks the engine's move: the external suggestion when it arrives in
/// time and is legal, otherwise a uniformly random legal move.
pub struct SuggestionService {
    suggester: Option<Arc<dyn MoveSuggester>>,
    chess_service: ChessService,
    timeout: Duration,
}

impl SuggestionService {
    pub fn new(
        suggester: Option<Arc<dyn MoveSuggester>>,
        chess_service: ChessService,
        timeout: Duration,
    ) -> Self {
        SuggestionService {
            suggester,
            chess_service,
            timeout,
        }
    }

    pub fn clamp_difficulty(difficulty: Option<u8>) -> u8 {
        difficulty
            .unwrap_or(DEFAULT_DIFFICULTY)
            .clamp(1, MAX_DIFFICULTY)
    }

    pub async fn choose_move(&self, fen: &str, difficulty: u8) -> Result<MoveRequest, SessionError> {
        let legal_moves = self.chess_service.legal_moves(fen)?;

        if let Some(suggester) = &self.suggester {
            match tokio::time::timeout(self.timeout, suggester.suggest(fen, difficulty)).await {
                Ok(Ok(uci)) if legal_moves.contains(&uci) => {
                    if let Some(request) = MoveRequest::from_uci(&uci) {
                        return Ok(request);
                    }
                }
                Ok(Ok(uci)) => warn!(suggested = %uci, "Suggestion is not legal, falling back"),
                Ok(Err(e)) => warn!(error = %e, "Suggestion failed, falling back"),
                Err(_) => warn!("Suggestion timed out, falling back"),
            }
        }

        let uci = legal_moves
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| SessionError::ExternalService("No legal moves".to_string()))?;
        debug!(fallback = %uci, "Random legal move chosen");
        MoveRequest::from_uci(uci)
            .ok_or_else(|| SessionError::ExternalService(format!("Unparseable move {}", uci)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::room::STARTING_FEN;

    fn service(suggester: Option<MockMoveSuggester>, timeout: Duration) -> SuggestionService {
        SuggestionService::new(
            suggester.map(|s| Arc::new(s) as Arc<dyn MoveSuggester>),
            ChessService::new(),
            timeout,
        )
    }

    #[tokio::test]
    async fn test_legal_suggestion_is_used() {
        let mut suggester = MockMoveSuggester::new();
        suggester
            .expect_suggest()
            .returning(|_, _| Ok("g1f3".to_string()));

        let chosen = service(Some(suggester), Duration::from_secs(2))
            .choose_move(STARTING_FEN, 5)
            .await
            .unwrap();

        assert_eq!(chosen.to_uci(), "g1f3");
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_legal_move() {
        let mut suggester = MockMoveSuggester::new();
        suggester
            .expect_suggest()
            .returning(|_, _| Err(SessionError::ExternalService("down".to_string())));

        let chosen = service(Some(suggester), Duration::from_secs(2))
            .choose_move(STARTING_FEN, 5)
            .await
            .unwrap();

        let legal = ChessService::new().legal_moves(STARTING_FEN).unwrap();
        assert!(legal.contains(&chosen.to_uci()));
    }

    #[tokio::test]
    async fn test_illegal_suggestion_is_ignored() {
        let mut suggester = MockMoveSuggester::new();
        suggester
            .expect_suggest()
            .returning(|_, _| Ok("e2e5".to_string()));

        let chosen = service(Some(suggester), Duration::from_secs(2))
            .choose_move(STARTING_FEN, 5)
            .await
            .unwrap();

        assert_ne!(chosen.to_uci(), "e2e5");
    }

    #[tokio::test]
    async fn test_no_suggester_uses_random_move() {
        let chosen = service(None, Duration::from_secs(2))
            .choose_move(STARTING_FEN, 1)
            .await
            .unwrap();

        assert_eq!(chosen.from_square.len(), 2);
    }

    #[test]
    fn test_difficulty_is_clamped() {
        assert_eq!(SuggestionService::clamp_difficulty(None), 5);
        assert_eq!(SuggestionService::clamp_difficulty(Some(0)), 1);
        assert_eq!(SuggestionService::clamp_difficulty(Some(42)), 10);
    }
}
