use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::match_history::GameResult;
use crate::models::player::{PlayerIdentity, PlayerProfile, DEFAULT_RATING};

/// A durable account as the orchestrator sees it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub rating: i32,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String) -> Self {
        User {
            id: Uuid::new_v4().to_string(),
            username,
            rating: DEFAULT_RATING,
            games_played: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            created_at: Utc::now(),
        }
    }

    pub fn profile(&self) -> PlayerProfile {
        PlayerProfile {
            identity: PlayerIdentity::Account(self.id.clone()),
            display_name: self.username.clone(),
            rating: self.rating,
            games_played: self.games_played,
        }
    }

    pub fn record_result(&mut self, result: GameResult) {
        self.games_played += 1;
        match result {
            GameResult::Win => self.wins += 1,
            GameResult::Loss => self.losses += 1,
            GameResult::Draw => self.draws += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("magnus".to_string());

        assert_eq!(user.rating, 1200);
        assert_eq!(user.games_played, 0);
        assert!(!user.id.is_empty());
    }

    #[test]
    fn test_record_result_updates_counters() {
        let mut user = User::new("magnus".to_string());

        user.record_result(GameResult::Win);
        user.record_result(GameResult::Draw);
        user.record_result(GameResult::Loss);

        assert_eq!(user.games_played, 3);
        assert_eq!((user.wins, user.draws, user.losses), (1, 1, 1));
    }

    #[test]
    fn test_profile_uses_account_identity() {
        let user = User::new("magnus".to_string());
        let profile = user.profile();

        assert_eq!(profile.identity, PlayerIdentity::Account(user.id.clone()));
        assert_eq!(profile.display_name, "magnus");
    }
}
