use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::room::MatchKind;
use crate::services::errors::SessionError;

/// Rating given to guests and to accounts that have never played.
pub const DEFAULT_RATING: i32 = 1200;

/// Identity of whoever occupies a slot: a durable account, an ephemeral
/// guest, or the built-in engine in AI rooms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PlayerIdentity {
    Account(String),
    Guest(String),
    Engine,
}

impl PlayerIdentity {
    /// Stable key used by every identity-indexed table.
    pub fn key(&self) -> String {
        match self {
            PlayerIdentity::Account(id) => format!("account:{}", id),
            PlayerIdentity::Guest(id) => format!("guest:{}", id),
            PlayerIdentity::Engine => "engine".to_string(),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, PlayerIdentity::Guest(_))
    }

    pub fn is_engine(&self) -> bool {
        matches!(self, PlayerIdentity::Engine)
    }

    pub fn account_id(&self) -> Option<&str> {
        match self {
            PlayerIdentity::Account(id) => Some(id),
            _ => None,
        }
    }

    /// Guests may only play casual games. Queueing, room creation and
    /// seating all go through this check.
    pub fn ensure_eligible(&self, kind: MatchKind) -> Result<(), SessionError> {
        if kind == MatchKind::Rated && !matches!(self, PlayerIdentity::Account(_)) {
            return Err(SessionError::Validation(
                "Guests cannot play rated games".to_string(),
            ));
        }
        Ok(())
    }

    pub fn new_guest_id() -> String {
        format!("guest_{}", Uuid::new_v4().simple())
    }
}

/// An authenticated player as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub identity: PlayerIdentity,
    pub display_name: String,
    pub rating: i32,
    pub games_played: u32,
}

impl PlayerProfile {
    pub fn guest(guest_id: &str, display_name: &str) -> Self {
        PlayerProfile {
            identity: PlayerIdentity::Guest(guest_id.to_string()),
            display_name: display_name.to_string(),
            rating: DEFAULT_RATING,
            games_played: 0,
        }
    }

    pub fn engine(difficulty: u8) -> Self {
        PlayerProfile {
            identity: PlayerIdentity::Engine,
            display_name: format!("Computer (level {})", difficulty),
            rating: DEFAULT_RATING,
            games_played: 0,
        }
    }
}
