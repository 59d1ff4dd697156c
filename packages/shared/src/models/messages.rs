use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::match_history::RatingChange;
use crate::models::move_request::MoveRequest;
use crate::models::room::{
    Color, ColorPreference, GameOutcome, MatchKind, MoveRecord, Room, TimeControl,
};

/// Message sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientEvent {
    Authenticate {
        token: String,
    },
    AuthenticateGuest {
        name: String,
        #[serde(default)]
        guest_id: Option<String>,
    },
    JoinQueue {
        match_kind: MatchKind,
        #[serde(default)]
        time_control: TimeControl,
        #[serde(default)]
        color_preference: ColorPreference,
    },
    LeaveQueue,
    CreateRoom {
        match_kind: MatchKind,
        #[serde(default)]
        time_control: TimeControl,
        #[serde(default)]
        color_preference: ColorPreference,
        #[serde(default)]
        is_private: bool,
        #[serde(default)]
        ai_difficulty: Option<u8>,
    },
    JoinRoomAsPlayer {
        room_id: String,
    },
    JoinRoom {
        room_id: String,
    },
    MakeMove {
        #[serde(default)]
        room_id: Option<String>,
        from: String,
        to: String,
        #[serde(default)]
        promotion: Option<String>,
    },
    Resign {
        #[serde(default)]
        room_id: Option<String>,
    },
    OfferDraw {
        #[serde(default)]
        room_id: Option<String>,
    },
    DrawResponse {
        #[serde(default)]
        room_id: Option<String>,
        accept: bool,
    },
    SendMessage {
        #[serde(default)]
        room_id: Option<String>,
        text: String,
    },
    Ping,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Authenticate { .. } => "authenticate",
            ClientEvent::AuthenticateGuest { .. } => "authenticate_guest",
            ClientEvent::JoinQueue { .. } => "join_queue",
            ClientEvent::LeaveQueue => "leave_queue",
            ClientEvent::CreateRoom { .. } => "create_room",
            ClientEvent::JoinRoomAsPlayer { .. } => "join_room_as_player",
            ClientEvent::JoinRoom { .. } => "join_room",
            ClientEvent::MakeMove { .. } => "make_move",
            ClientEvent::Resign { .. } => "resign",
            ClientEvent::OfferDraw { .. } => "offer_draw",
            ClientEvent::DrawResponse { .. } => "draw_response",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::Ping => "ping",
        }
    }

    pub fn move_request(from: &str, to: &str, promotion: Option<&str>) -> MoveRequest {
        match promotion {
            Some(piece) => MoveRequest::with_promotion(from, to, piece),
            None => MoveRequest::new(from, to),
        }
    }
}

/// Message sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerEvent {
    Authenticated {
        player_id: String,
        display_name: String,
        is_guest: bool,
        rating: i32,
    },
    AuthenticationError {
        message: String,
    },
    QueueJoined {
        match_kind: MatchKind,
        time_control: TimeControl,
    },
    QueueLeft,
    MatchFound {
        room_id: String,
        color: Color,
        opponent_name: String,
        opponent_rating: i32,
    },
    RoomCreated {
        room: Box<Room>,
    },
    RoomUpdate {
        room: Box<Room>,
    },
    GameStarted {
        room: Box<Room>,
    },
    MoveMade {
        room_id: String,
        record: MoveRecord,
        position: String,
        current_turn: Color,
        white_time_ms: Option<u64>,
        black_time_ms: Option<u64>,
    },
    InvalidMove {
        message: String,
    },
    TimeUpdate {
        room_id: String,
        current_turn: Color,
        white_time_ms: Option<u64>,
        black_time_ms: Option<u64>,
    },
    GameEnded {
        room_id: String,
        result: GameOutcome,
        position: String,
        rating_changes: Vec<RatingChange>,
    },
    DrawOffered {
        room_id: String,
        by: Color,
    },
    DrawDeclined {
        room_id: String,
    },
    OpponentDisconnected {
        room_id: String,
        grace_seconds: u64,
    },
    OpponentReconnected {
        room_id: String,
    },
    GameReconnected {
        room: Box<Room>,
    },
    ChatMessage {
        room_id: String,
        from: String,
        text: String,
        sent_at: DateTime<Utc>,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_queue_with_defaults() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"action":"join_queue","match_kind":"casual"}"#).unwrap();

        assert_eq!(
            event,
            ClientEvent::JoinQueue {
                match_kind: MatchKind::Casual,
                time_control: TimeControl::Seconds(600),
                color_preference: ColorPreference::Random,
            }
        );
    }

    #[test]
    fn test_parse_unlimited_room() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"action":"create_room","match_kind":"ai","time_control":null,"ai_difficulty":3}"#,
        )
        .unwrap();

        match event {
            ClientEvent::CreateRoom {
                time_control,
                ai_difficulty,
                is_private,
                ..
            } => {
                assert_eq!(time_control, TimeControl::Unlimited);
                assert_eq!(ai_difficulty, Some(3));
                assert!(!is_private);
            }
            other => panic!("Expected CreateRoom, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_make_move_and_unit_actions() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"action":"make_move","from":"e2","to":"e4"}"#).unwrap();
        assert_eq!(event.name(), "make_move");

        let event: ClientEvent = serde_json::from_str(r#"{"action":"leave_queue"}"#).unwrap();
        assert_eq!(event, ClientEvent::LeaveQueue);
    }

    #[test]
    fn test_server_event_is_action_tagged() {
        let serialized = serde_json::to_string(&ServerEvent::DrawDeclined {
            room_id: "r1".to_string(),
        })
        .unwrap();

        assert_eq!(serialized, r#"{"action":"draw_declined","room_id":"r1"}"#);
    }
}
