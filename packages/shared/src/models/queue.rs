use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::player::PlayerProfile;
use crate::models::room::{ColorPreference, MatchKind, TimeControl};

/// A player waiting in the matchmaking queue.
/// Entries live only in memory; they are removed on pairing, leave or disconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub player: PlayerProfile,
    pub rating: i32,
    pub match_kind: MatchKind,
    pub time_control: TimeControl,
    pub color_preference: ColorPreference,
    pub joined_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(
        player: PlayerProfile,
        match_kind: MatchKind,
        time_control: TimeControl,
        color_preference: ColorPreference,
    ) -> Self {
        QueueEntry {
            rating: player.rating,
            player,
            match_kind,
            time_control,
            color_preference,
            joined_at: Utc::now(),
        }
    }

    pub fn player_key(&self) -> String {
        self.player.identity.key()
    }

    pub fn same_bucket(&self, other: &QueueEntry) -> bool {
        self.match_kind == other.match_kind && self.time_control == other.time_control
    }
}
