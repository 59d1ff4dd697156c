use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::messages::ServerEvent;
use crate::models::player::{PlayerIdentity, PlayerProfile};
use crate::services::errors::SessionError;

/// Outbound half of a connection. The transport drains it into the socket.
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

struct Connection {
    sender: Outbound,
    profile: Option<PlayerProfile>,
    last_move_at: Option<Instant>,
}

/// Binds transport connections to player identities.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Connection>>,
    /// identity key -> connection id of its live binding
    bindings: RwLock<HashMap<String, String>>,
    min_move_interval: Duration,
}

impl ConnectionRegistry {
    pub fn new(min_move_interval: Duration) -> Self {
        ConnectionRegistry {
            connections: RwLock::new(HashMap::new()),
            bindings: RwLock::new(HashMap::new()),
            min_move_interval,
        }
    }

    pub async fn register(&self, connection_id: &str, sender: Outbound) {
        self.connections.write().await.insert(
            connection_id.to_string(),
            Connection {
                sender,
                profile: None,
                last_move_at: None,
            },
        );
        debug!(connection_id = %connection_id, "Connection registered");
    }

    /// Binds an authenticated identity to a connection. A newer connection
    /// for the same identity supersedes the older one; the superseded
    /// connection id is returned.
    pub async fn bind(&self, connection_id: &str, profile: PlayerProfile) -> Option<String> {
        let key = profile.identity.key();
        let mut connections = self.connections.write().await;
        let mut bindings = self.bindings.write().await;

        if let Some(connection) = connections.get_mut(connection_id) {
            if let Some(previous) = connection.profile.take() {
                let previous_key = previous.identity.key();
                if bindings.get(&previous_key).map(String::as_str) == Some(connection_id) {
                    bindings.remove(&previous_key);
                }
            }
            connection.profile = Some(profile);
        }

        let superseded = bindings
            .insert(key.clone(), connection_id.to_string())
            .filter(|old| old != connection_id);
        if let Some(old) = &superseded {
            if let Some(connection) = connections.get_mut(old) {
                connection.profile = None;
            }
            info!(player = %key, old_connection = %old, "Identity moved to a new connection");
        }
        superseded
    }

    /// Drops the connection. Returns the identity only when this connection
    /// was that identity's live binding.
    pub async fn unregister(&self, connection_id: &str) -> Option<PlayerIdentity> {
        let connection = self.connections.write().await.remove(connection_id)?;
        let identity = connection.profile?.identity;

        let mut bindings = self.bindings.write().await;
        let key = identity.key();
        if bindings.get(&key).map(String::as_str) == Some(connection_id) {
            bindings.remove(&key);
            Some(identity)
        } else {
            None
        }
    }

    pub async fn profile(&self, connection_id: &str) -> Option<PlayerProfile> {
        self.connections
            .read()
            .await
            .get(connection_id)
            .and_then(|c| c.profile.clone())
    }

    /// Refreshes the rating a bound account will be seated with next.
    pub async fn update_rating(&self, identity: &PlayerIdentity, rating: i32, games_played: u32) {
        let Some(connection_id) = self.bindings.read().await.get(&identity.key()).cloned() else {
            return;
        };
        if let Some(profile) = self
            .connections
            .write()
            .await
            .get_mut(&connection_id)
            .and_then(|c| c.profile.as_mut())
        {
            profile.rating = rating;
            profile.games_played = games_played;
        }
    }

    pub async fn is_online(&self, identity: &PlayerIdentity) -> bool {
        self.bindings.read().await.contains_key(&identity.key())
    }

    pub async fn send_to_connection(&self, connection_id: &str, event: ServerEvent) -> bool {
        match self.connections.read().await.get(connection_id) {
            Some(connection) => connection.sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Delivers to the identity's live connection, if any.
    pub async fn send(&self, identity: &PlayerIdentity, event: ServerEvent) -> bool {
        let Some(connection_id) = self.bindings.read().await.get(&identity.key()).cloned() else {
            return false;
        };
        self.send_to_connection(&connection_id, event).await
    }

    pub async fn broadcast(&self, identities: &[PlayerIdentity], event: &ServerEvent) {
        for identity in identities {
            self.send(identity, event.clone()).await;
        }
    }

    /// Per-connection throttle on move submissions.
    pub async fn admit_move(&self, connection_id: &str) -> Result<(), SessionError> {
        let mut connections = self.connections.write().await;
        let Some(connection) = connections.get_mut(connection_id) else {
            return Ok(());
        };
        let now = Instant::now();
        if let Some(last) = connection.last_move_at {
            if now.duration_since(last) < self.min_move_interval {
                return Err(SessionError::RateLimited);
            }
        }
        connection.last_move_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest(id: &str) -> PlayerProfile {
        PlayerProfile::guest(id, "Guest")
    }

    #[tokio::test]
    async fn test_send_reaches_bound_identity() {
        let registry = ConnectionRegistry::new(Duration::from_millis(300));
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("c1", tx).await;
        registry.bind("c1", guest("guest_a")).await;

        assert!(registry.send(&guest("guest_a").identity, ServerEvent::Pong).await);
        assert_eq!(rx.recv().await, Some(ServerEvent::Pong));
    }

    #[tokio::test]
    async fn test_superseded_connection_does_not_unbind_identity() {
        let registry = ConnectionRegistry::new(Duration::from_millis(300));
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        registry.register("c1", tx1).await;
        registry.register("c2", tx2).await;

        registry.bind("c1", guest("guest_a")).await;
        let superseded = registry.bind("c2", guest("guest_a")).await;

        assert_eq!(superseded.as_deref(), Some("c1"));
        assert_eq!(registry.unregister("c1").await, None);
        assert!(registry.is_online(&guest("guest_a").identity).await);
        assert_eq!(
            registry.unregister("c2").await,
            Some(guest("guest_a").identity)
        );
        assert!(!registry.is_online(&guest("guest_a").identity).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_move_enforces_interval() {
        let registry = ConnectionRegistry::new(Duration::from_millis(300));
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("c1", tx).await;

        assert!(registry.admit_move("c1").await.is_ok());
        assert_eq!(
            registry.admit_move("c1").await,
            Err(SessionError::RateLimited)
        );

        tokio::time::advance(Duration::from_millis(301)).await;
        assert!(registry.admit_move("c1").await.is_ok());
    }

    #[tokio::test]
    async fn test_update_rating_refreshes_profile() {
        let registry = ConnectionRegistry::new(Duration::from_millis(300));
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("c1", tx).await;
        let profile = PlayerProfile {
            identity: PlayerIdentity::Account("u1".to_string()),
            display_name: "u1".to_string(),
            rating: 1500,
            games_played: 3,
        };
        registry.bind("c1", profile.clone()).await;

        registry.update_rating(&profile.identity, 1516, 4).await;

        let refreshed = registry.profile("c1").await.unwrap();
        assert_eq!(refreshed.rating, 1516);
        assert_eq!(refreshed.games_played, 4);
    }
}
