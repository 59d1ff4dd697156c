use tracing::{error, info};

use crate::models::match_history::{GameResult, HistoryMove, MatchHistory, RatingChange};
use crate::models::room::{MatchKind, PlayerSlot, Room, STARTING_FEN};
use crate::services::chess_service::ChessService;

/// Rated games an account needs before leaving the provisional band.
const PROVISIONAL_GAMES: u32 = 30;

/// Durable account change produced by a rated game.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountUpdate {
    pub account_id: String,
    pub result: GameResult,
    pub rating_after: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settlement {
    pub rating_changes: Vec<RatingChange>,
    pub records: Vec<MatchHistory>,
    pub account_updates: Vec<AccountUpdate>,
}

#[derive(Clone, Default)]
pub struct SettlementService {
    chess_service: ChessService,
}

impl SettlementService {
    pub fn new(chess_service: ChessService) -> Self {
        SettlementService { chess_service }
    }

    /// Computes the outcome of a finished room. Pure: the caller is
    /// responsible for making the writes durable.
    pub fn settle(&self, room: &Room) -> Settlement {
        let (Some(outcome), Some(opponent)) = (room.result, room.player2.as_ref()) else {
            return Settlement::default();
        };
        let seats = [(&room.player1, opponent), (opponent, &room.player1)];

        let rated = room.match_kind == MatchKind::Rated
            && seats.iter().all(|(slot, _)| slot.identity.account_id().is_some());
        let moves = self.replayed_moves(room);

        let mut settlement = Settlement::default();
        for (slot, other) in seats {
            let Some(account_id) = slot.identity.account_id() else {
                continue;
            };
            let result = GameResult::for_color(outcome.winner, slot.color);
            let delta = if rated {
                rating_delta(slot, other.rating, result)
            } else {
                0
            };

            if rated {
                settlement.rating_changes.push(RatingChange {
                    player_id: account_id.to_string(),
                    color: slot.color,
                    rating_before: slot.rating,
                    rating_after: slot.rating + delta,
                    delta,
                });
                settlement.account_updates.push(AccountUpdate {
                    account_id: account_id.to_string(),
                    result,
                    rating_after: slot.rating + delta,
                });
            }
            settlement.records.push(MatchHistory::new(
                &room.room_id,
                account_id,
                &other.display_name,
                slot.color,
                room.match_kind,
                result,
                outcome.reason,
                slot.rating,
                delta,
                moves.clone(),
            ));
        }

        info!(
            room_id = %room.room_id,
            rated,
            records = settlement.records.len(),
            "Room settled"
        );
        settlement
    }

    /// Rebuilds the move list through the rules oracle. Falls back to the
    /// logged moves if the replay disagrees with the live position.
    fn replayed_moves(&self, room: &Room) -> Vec<HistoryMove> {
        match self.chess_service.replay(&room.move_log) {
            Ok(moves) => {
                let final_fen = moves
                    .last()
                    .map(|m| m.fen.as_str())
                    .unwrap_or(STARTING_FEN);
                if final_fen == room.position {
                    return moves;
                }
                error!(
                    room_id = %room.room_id,
                    replayed = %final_fen,
                    stored = %room.position,
                    "Move log does not replay to the stored position"
                );
            }
            Err(e) => {
                error!(room_id = %room.room_id, error = %e, "Move log failed to replay");
            }
        }
        room.move_log
            .iter()
            .map(|record| HistoryMove {
                move_number: record.move_number,
                from: record.from.clone(),
                to: record.to.clone(),
                piece: record.piece.clone(),
                san: record.san.clone(),
                fen: record.fen_after.clone(),
                time_left_ms: record.time_left_ms,
            })
            .collect()
    }
}

/// Logistic expected score of `rating` against `opponent_rating`.
pub fn expected_score(rating: i32, opponent_rating: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf(f64::from(opponent_rating - rating) / 400.0))
}

pub fn k_factor(rating: i32, games_played: u32) -> f64 {
    if games_played < PROVISIONAL_GAMES {
        40.0
    } else if rating < 2100 {
        32.0
    } else if rating < 2400 {
        24.0
    } else {
        16.0
    }
}

fn rating_delta(slot: &PlayerSlot, opponent_rating: i32, result: GameResult) -> i32 {
    let k = k_factor(slot.rating, slot.games_played);
    (k * (result.score() - expected_score(slot.rating, opponent_rating))).round() as i32
}
