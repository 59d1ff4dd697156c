use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::services::timer::TimerHandle;

/// Grace timers for seated players whose connection dropped mid-game,
/// keyed by room id and identity key.
pub struct ReconnectionManager {
    grace_period: Duration,
    timers: Mutex<HashMap<(String, String), TimerHandle>>,
}

impl ReconnectionManager {
    pub fn new(grace_period: Duration) -> Self {
        ReconnectionManager {
            grace_period,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Arms the timer; `expired` is delivered to the room mailbox unless
    /// the timer is cancelled first. Re-arming replaces an earlier timer.
    pub async fn start<T: Send + 'static>(
        &self,
        room_id: &str,
        player_key: &str,
        sender: mpsc::Sender<T>,
        expired: T,
    ) {
        let timer = TimerHandle::once(self.grace_period, sender, expired);
        self.timers
            .lock()
            .await
            .insert((room_id.to_string(), player_key.to_string()), timer);
        debug!(room_id = %room_id, player = %player_key, "Grace timer started");
    }

    /// Returns whether a timer was pending.
    pub async fn cancel(&self, room_id: &str, player_key: &str) -> bool {
        let removed = self
            .timers
            .lock()
            .await
            .remove(&(room_id.to_string(), player_key.to_string()));
        match removed {
            Some(timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn cancel_room(&self, room_id: &str) {
        self.timers
            .lock()
            .await
            .retain(|(room, _), _| room != room_id);
    }

    pub async fn is_pending(&self, room_id: &str, player_key: &str) -> bool {
        self.timers
            .lock()
            .await
            .get(&(room_id.to_string(), player_key.to_string()))
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_delivered() {
        let manager = ReconnectionManager::new(Duration::from_secs(60));
        let (tx, mut rx) = mpsc::channel(4);

        manager.start("room-1", "guest:a", tx, "expired").await;
        assert!(manager.is_pending("room-1", "guest:a").await);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(rx.recv().await, Some("expired"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_expiry() {
        let manager = ReconnectionManager::new(Duration::from_secs(60));
        let (tx, mut rx) = mpsc::channel(4);
        manager.start("room-1", "guest:a", tx, ()).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(manager.cancel("room-1", "guest:a").await);
        assert!(!manager.cancel("room-1", "guest:a").await);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_room_clears_every_player() {
        let manager = ReconnectionManager::new(Duration::from_secs(60));
        let (tx, mut rx) = mpsc::channel(4);
        manager.start("room-1", "guest:a", tx.clone(), 1).await;
        manager.start("room-1", "guest:b", tx.clone(), 2).await;
        manager.start("room-2", "guest:c", tx, 3).await;

        manager.cancel_room("room-1").await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(rx.recv().await, Some(3));
        assert!(!manager.is_pending("room-1", "guest:b").await);
    }
}
