use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::player::{PlayerIdentity, PlayerProfile};
use crate::services::errors::SessionError;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    InProgress,
    /// Not entered by any transition yet.
    Paused,
    Finished,
    Abandoned,
}

impl RoomStatus {
    fn rank(self) -> u8 {
        match self {
            RoomStatus::Waiting => 0,
            RoomStatus::InProgress | RoomStatus::Paused => 1,
            RoomStatus::Finished | RoomStatus::Abandoned => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RoomStatus::Finished | RoomStatus::Abandoned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Casual,
    Rated,
    Ai,
}

/// Seconds per side, or `null` on the wire for an unlimited game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeControl {
    Seconds(u32),
    Unlimited,
}

impl Default for TimeControl {
    fn default() -> Self {
        TimeControl::Seconds(600)
    }
}

impl TimeControl {
    pub fn validate(self) -> Result<(), SessionError> {
        if self == TimeControl::Seconds(0) {
            return Err(SessionError::Validation(
                "Time control must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bank_ms(self) -> Option<u64> {
        match self {
            TimeControl::Seconds(seconds) => Some(u64::from(seconds) * 1000),
            TimeControl::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorPreference {
    White,
    Black,
    #[default]
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    FiftyMoveRule,
    Resignation,
    Agreement,
    Timeout,
    Abandonment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcome {
    /// `None` is a draw.
    pub winner: Option<Color>,
    pub reason: EndReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub identity: PlayerIdentity,
    pub display_name: String,
    pub color: Color,
    /// `None` when the room has no time control.
    pub time_left_ms: Option<u64>,
    pub ready: bool,
    pub connected: bool,
    /// Rating snapshot taken when the player was seated.
    pub rating: i32,
    pub games_played: u32,
}

impl PlayerSlot {
    fn from_profile(profile: &PlayerProfile, color: Color, time_control: TimeControl) -> Self {
        PlayerSlot {
            identity: profile.identity.clone(),
            display_name: profile.display_name.clone(),
            color,
            time_left_ms: time_control.bank_ms(),
            ready: true,
            connected: true,
            rating: profile.rating,
            games_played: profile.games_played,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// 1-based ply number.
    pub move_number: u32,
    pub color: Color,
    pub from: String,
    pub to: String,
    pub promotion: Option<String>,
    pub piece: String,
    pub san: String,
    pub fen_after: String,
    pub time_left_ms: Option<u64>,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub player1: PlayerSlot,
    pub player2: Option<PlayerSlot>,
    pub spectators: Vec<PlayerIdentity>,
    pub status: RoomStatus,
    pub current_turn: Color,
    pub time_control: TimeControl,
    pub match_kind: MatchKind,
    pub ai_difficulty: Option<u8>,
    pub position: String,
    pub position_hashes: Vec<u64>,
    pub halfmove_clock: u32,
    pub move_log: Vec<MoveRecord>,
    pub result: Option<GameOutcome>,
    pub draw_offer: Option<Color>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Room {
    pub fn new(
        creator: &PlayerProfile,
        creator_color: Color,
        match_kind: MatchKind,
        time_control: TimeControl,
        is_private: bool,
        initial_hash: u64,
    ) -> Self {
        let now = Utc::now();
        Room {
            room_id: Uuid::new_v4().to_string(),
            player1: PlayerSlot::from_profile(creator, creator_color, time_control),
            player2: None,
            spectators: vec![],
            status: RoomStatus::Waiting,
            current_turn: Color::White,
            time_control,
            match_kind,
            ai_difficulty: None,
            position: STARTING_FEN.to_string(),
            position_hashes: vec![initial_hash],
            halfmove_clock: 0,
            move_log: vec![],
            result: None,
            draw_offer: None,
            is_private,
            created_at: now,
            last_activity: now,
        }
    }

    /// Moves the room forward in its lifecycle. Status never goes backwards.
    pub fn advance(&mut self, next: RoomStatus) -> Result<(), SessionError> {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return Err(SessionError::Validation(format!(
                "Room cannot move from {:?} to {:?}",
                self.status, next
            )));
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Fills the second slot with the opposite colour and starts the game.
    pub fn seat(&mut self, profile: &PlayerProfile) -> Result<Color, SessionError> {
        if self.slot_for(&profile.identity).is_some() {
            return Err(SessionError::StateConflict(
                "Already seated in this room".to_string(),
            ));
        }
        if self.player2.is_some() {
            return Err(SessionError::StateConflict("Room is full".to_string()));
        }
        if self.status != RoomStatus::Waiting {
            return Err(SessionError::StateConflict(
                "Room is closed to joining".to_string(),
            ));
        }
        profile.identity.ensure_eligible(self.match_kind)?;

        let color = self.player1.color.opposite();
        self.player2 = Some(PlayerSlot::from_profile(profile, color, self.time_control));
        self.spectators.retain(|s| s != &profile.identity);
        self.advance(RoomStatus::InProgress)?;
        Ok(color)
    }

    pub fn slots(&self) -> impl Iterator<Item = &PlayerSlot> {
        std::iter::once(&self.player1).chain(self.player2.iter())
    }

    pub fn slot_for(&self, identity: &PlayerIdentity) -> Option<&PlayerSlot> {
        self.slots().find(|slot| &slot.identity == identity)
    }

    pub fn slot_for_mut(&mut self, identity: &PlayerIdentity) -> Option<&mut PlayerSlot> {
        if &self.player1.identity == identity {
            return Some(&mut self.player1);
        }
        self.player2.as_mut().filter(|slot| &slot.identity == identity)
    }

    pub fn slot_by_color(&self, color: Color) -> Option<&PlayerSlot> {
        self.slots().find(|slot| slot.color == color)
    }

    pub fn slot_by_color_mut(&mut self, color: Color) -> Option<&mut PlayerSlot> {
        if self.player1.color == color {
            return Some(&mut self.player1);
        }
        self.player2.as_mut().filter(|slot| slot.color == color)
    }

    pub fn color_of(&self, identity: &PlayerIdentity) -> Option<Color> {
        self.slot_for(identity).map(|slot| slot.color)
    }

    /// Human identities that receive room broadcasts.
    pub fn participants(&self) -> Vec<PlayerIdentity> {
        self.slots()
            .map(|slot| slot.identity.clone())
            .chain(self.spectators.iter().cloned())
            .filter(|identity| !identity.is_engine())
            .collect()
    }

    pub fn engine_color(&self) -> Option<Color> {
        self.slots()
            .find(|slot| slot.identity.is_engine())
            .map(|slot| slot.color)
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> PlayerProfile {
        PlayerProfile {
            identity: PlayerIdentity::Account(id.to_string()),
            display_name: id.to_string(),
            rating: 1500,
            games_played: 10,
        }
    }

    fn waiting_room() -> Room {
        Room::new(
            &profile("alice"),
            Color::White,
            MatchKind::Casual,
            TimeControl::Seconds(300),
            false,
            0,
        )
    }

    #[test]
    fn test_zero_second_time_control_is_invalid() {
        assert!(matches!(
            TimeControl::Seconds(0).validate(),
            Err(SessionError::Validation(_))
        ));
        assert!(TimeControl::Seconds(1).validate().is_ok());
        assert!(TimeControl::Unlimited.validate().is_ok());
    }

    #[test]
    fn test_new_room_is_waiting_with_one_slot() {
        let room = waiting_room();

        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.current_turn, Color::White);
        assert_eq!(room.position, STARTING_FEN);
        assert!(room.player2.is_none());
        assert_eq!(room.player1.time_left_ms, Some(300_000));
    }

    #[test]
    fn test_seat_assigns_opposite_color_and_starts() {
        let mut room = waiting_room();

        let color = room.seat(&profile("bob")).unwrap();

        assert_eq!(color, Color::Black);
        assert_ne!(room.player1.color, room.player2.as_ref().unwrap().color);
        assert_eq!(room.status, RoomStatus::InProgress);
    }

    #[test]
    fn test_seat_rejects_creator_and_full_room() {
        let mut room = waiting_room();

        assert!(matches!(
            room.seat(&profile("alice")),
            Err(SessionError::StateConflict(_))
        ));
        room.seat(&profile("bob")).unwrap();
        assert!(matches!(
            room.seat(&profile("carol")),
            Err(SessionError::StateConflict(_))
        ));
    }

    #[test]
    fn test_seat_rejects_guest_in_rated_room() {
        let mut room = Room::new(
            &profile("alice"),
            Color::Black,
            MatchKind::Rated,
            TimeControl::Unlimited,
            false,
            0,
        );

        let result = room.seat(&PlayerProfile::guest("guest_1", "Guest"));

        assert!(matches!(result, Err(SessionError::Validation(_))));
        assert!(room.player2.is_none());
        assert_eq!(room.status, RoomStatus::Waiting);
    }

    #[test]
    fn test_status_never_moves_backwards() {
        let mut room = waiting_room();
        room.advance(RoomStatus::InProgress).unwrap();

        assert!(room.advance(RoomStatus::Waiting).is_err());
        assert!(room.advance(RoomStatus::Paused).is_err());
        room.advance(RoomStatus::Finished).unwrap();
        assert!(room.advance(RoomStatus::Abandoned).is_err());
    }

    #[test]
    fn test_participants_exclude_engine() {
        let mut room = waiting_room();
        room.seat(&PlayerProfile::engine(3)).unwrap();
        room.spectators.push(PlayerIdentity::Guest("watcher".to_string()));

        let participants = room.participants();

        assert_eq!(participants.len(), 2);
        assert!(!participants.contains(&PlayerIdentity::Engine));
        assert_eq!(room.engine_color(), Some(Color::Black));
    }

    #[test]
    fn test_time_control_wire_format() {
        assert_eq!(
            serde_json::from_str::<TimeControl>("600").unwrap(),
            TimeControl::Seconds(600)
        );
        assert_eq!(
            serde_json::from_str::<TimeControl>("null").unwrap(),
            TimeControl::Unlimited
        );
        assert_eq!(TimeControl::Unlimited.bank_ms(), None);
    }
}
