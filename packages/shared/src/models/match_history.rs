use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::room::{Color, EndReason, MatchKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

impl GameResult {
    pub fn for_color(winner: Option<Color>, color: Color) -> Self {
        match winner {
            None => GameResult::Draw,
            Some(w) if w == color => GameResult::Win,
            Some(_) => GameResult::Loss,
        }
    }

    pub fn score(self) -> f64 {
        match self {
            GameResult::Win => 1.0,
            GameResult::Draw => 0.5,
            GameResult::Loss => 0.0,
        }
    }
}

/// Rating movement of one seat, reported in `game_ended`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
    pub player_id: String,
    pub color: Color,
    pub rating_before: i32,
    pub rating_after: i32,
    pub delta: i32,
}

/// One entry of a replayable move list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMove {
    pub move_number: u32,
    pub from: String,
    pub to: String,
    pub piece: String,
    pub san: String,
    pub fen: String,
    pub time_left_ms: Option<u64>,
}

/// Immutable record written once per account participant at settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchHistory {
    pub history_id: String,
    pub room_id: String,
    pub player_id: String,
    pub opponent_name: String,
    pub color: Color,
    pub match_kind: MatchKind,
    pub result: GameResult,
    pub end_reason: EndReason,
    pub rating_before: i32,
    pub rating_after: i32,
    pub rating_delta: i32,
    pub moves: Vec<HistoryMove>,
    pub played_at: DateTime<Utc>,
}

impl MatchHistory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        room_id: &str,
        player_id: &str,
        opponent_name: &str,
        color: Color,
        match_kind: MatchKind,
        result: GameResult,
        end_reason: EndReason,
        rating_before: i32,
        rating_delta: i32,
        moves: Vec<HistoryMove>,
    ) -> Self {
        MatchHistory {
            history_id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            player_id: player_id.to_string(),
            opponent_name: opponent_name.to_string(),
            color,
            match_kind,
            result,
            end_reason,
            rating_before,
            rating_after: rating_before + rating_delta,
            rating_delta,
            moves,
            played_at: Utc::now(),
        }
    }
}
