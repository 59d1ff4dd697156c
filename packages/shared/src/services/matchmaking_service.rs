use rand::Rng;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::queue::QueueEntry;
use crate::models::room::{Color, ColorPreference};
use crate::services::errors::SessionError;

/// Two entries removed from the queue together, already assigned colours.
#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub white: QueueEntry,
    pub black: QueueEntry,
}

/// In-memory queue bucketed by match kind and time control.
pub struct MatchmakingQueue {
    entries: Mutex<Vec<QueueEntry>>,
    rating_window: i32,
}

impl MatchmakingQueue {
    pub fn new(rating_window: i32) -> Self {
        MatchmakingQueue {
            entries: Mutex::new(Vec::new()),
            rating_window,
        }
    }

    /// Enqueues `entry`, replacing any earlier entry of the same identity,
    /// and pairs it with the oldest compatible waiting entry if there is one.
    pub async fn enqueue(&self, entry: QueueEntry) -> Result<Option<Pairing>, SessionError> {
        entry.player.identity.ensure_eligible(entry.match_kind)?;

        let key = entry.player_key();
        let mut entries = self.entries.lock().await;
        entries.retain(|e| e.player_key() != key);

        let opponent = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.same_bucket(&entry))
            .filter(|(_, e)| (e.rating - entry.rating).abs() <= self.rating_window)
            .min_by_key(|(_, e)| e.joined_at)
            .map(|(index, _)| index);

        match opponent {
            Some(index) => {
                let opponent = entries.remove(index);
                drop(entries);

                let opponent_color = resolve_colors(
                    opponent.color_preference,
                    entry.color_preference,
                    &mut rand::thread_rng(),
                );
                info!(
                    first = %opponent.player_key(),
                    second = %key,
                    "Paired queue entries"
                );
                Ok(Some(match opponent_color {
                    Color::White => Pairing {
                        white: opponent,
                        black: entry,
                    },
                    Color::Black => Pairing {
                        white: entry,
                        black: opponent,
                    },
                }))
            }
            None => {
                entries.push(entry);
                Ok(None)
            }
        }
    }

    /// Removes the identity's entry. Returns whether one existed.
    pub async fn leave(&self, player_key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.player_key() != player_key);
        entries.len() != before
    }

    pub async fn contains(&self, player_key: &str) -> bool {
        self.entries
            .lock()
            .await
            .iter()
            .any(|e| e.player_key() == player_key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Colour of the `first` side given both preferences.
pub fn resolve_colors<R: Rng>(
    first: ColorPreference,
    second: ColorPreference,
    rng: &mut R,
) -> Color {
    use ColorPreference::{Black, White};
    match (first, second) {
        (White, s) if s != White => Color::White,
        (f, White) if f != White => Color::Black,
        (Black, s) if s != Black => Color::Black,
        (f, Black) if f != Black => Color::White,
        _ => {
            if rng.gen_bool(0.5) {
                Color::White
            } else {
                Color::Black
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::player::{PlayerIdentity, PlayerProfile};
    use crate::models::room::{MatchKind, TimeControl};
    use chrono::Duration;
    use rand::rngs::mock::StepRng;
    use rstest::rstest;

    fn entry(id: &str, rating: i32, age_secs: i64) -> QueueEntry {
        let mut entry = QueueEntry::new(
            PlayerProfile {
                identity: PlayerIdentity::Account(id.to_string()),
                display_name: id.to_string(),
                rating,
                games_played: 50,
            },
            MatchKind::Casual,
            TimeControl::Seconds(600),
            ColorPreference::Random,
        );
        entry.joined_at = entry.joined_at - Duration::seconds(age_secs);
        entry
    }

    #[tokio::test]
    async fn test_pairs_within_window_only() {
        let queue = MatchmakingQueue::new(200);

        assert!(queue.enqueue(entry("a", 1500, 30)).await.unwrap().is_none());
        assert!(queue.enqueue(entry("c", 1900, 20)).await.unwrap().is_none());
        let pairing = queue.enqueue(entry("b", 1650, 10)).await.unwrap().unwrap();

        let mut ids = vec![
            pairing.white.player_key(),
            pairing.black.player_key(),
        ];
        ids.sort();
        assert_eq!(ids, vec!["account:a", "account:b"]);
        assert_eq!(queue.len().await, 1);
        assert!(queue.contains("account:c").await);
    }

    #[tokio::test]
    async fn test_oldest_compatible_entry_wins() {
        let queue = MatchmakingQueue::new(200);
        queue.enqueue(entry("young", 1450, 5)).await.unwrap();
        queue.enqueue(entry("old", 1700, 60)).await.unwrap();

        let pairing = queue.enqueue(entry("new", 1560, 0)).await.unwrap().unwrap();

        let keys = [pairing.white.player_key(), pairing.black.player_key()];
        assert!(keys.contains(&"account:old".to_string()));
        assert!(queue.contains("account:young").await);
    }

    #[tokio::test]
    async fn test_different_buckets_never_pair() {
        let queue = MatchmakingQueue::new(200);
        queue.enqueue(entry("a", 1500, 10)).await.unwrap();

        let mut blitz = entry("b", 1500, 0);
        blitz.time_control = TimeControl::Seconds(180);

        assert!(queue.enqueue(blitz).await.unwrap().is_none());
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_reenqueue_replaces_previous_entry() {
        let queue = MatchmakingQueue::new(200);
        queue.enqueue(entry("a", 1500, 10)).await.unwrap();

        assert!(queue.enqueue(entry("a", 1500, 0)).await.unwrap().is_none());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let queue = MatchmakingQueue::new(200);
        queue.enqueue(entry("a", 1500, 10)).await.unwrap();

        assert!(queue.leave("account:a").await);
        assert!(!queue.leave("account:a").await);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_guest_cannot_queue_rated() {
        let queue = MatchmakingQueue::new(200);
        let guest = QueueEntry::new(
            PlayerProfile::guest("guest_x", "Visitor"),
            MatchKind::Rated,
            TimeControl::Seconds(600),
            ColorPreference::Random,
        );

        assert!(matches!(
            queue.enqueue(guest).await,
            Err(SessionError::Validation(_))
        ));
        assert!(queue.is_empty().await);
    }

    #[rstest]
    #[case(ColorPreference::White, ColorPreference::Random, Color::White)]
    #[case(ColorPreference::White, ColorPreference::Black, Color::White)]
    #[case(ColorPreference::Random, ColorPreference::White, Color::Black)]
    #[case(ColorPreference::Black, ColorPreference::Random, Color::Black)]
    #[case(ColorPreference::Random, ColorPreference::Black, Color::White)]
    #[case(ColorPreference::Black, ColorPreference::White, Color::Black)]
    fn test_resolve_colors_honours_single_preference(
        #[case] first: ColorPreference,
        #[case] second: ColorPreference,
        #[case] expected: Color,
    ) {
        let mut rng = StepRng::new(0, 1);
        assert_eq!(resolve_colors(first, second, &mut rng), expected);
    }

    #[test]
    fn test_resolve_colors_conflicts_are_random() {
        let mut low = StepRng::new(0, 0);
        let mut high = StepRng::new(u64::MAX, 0);

        let a = resolve_colors(ColorPreference::White, ColorPreference::White, &mut low);
        let b = resolve_colors(ColorPreference::White, ColorPreference::White, &mut high);
        assert_ne!(a, b);
    }
}
