use std::sync::Arc;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::models::messages::{ClientEvent, ServerEvent};
use crate::models::move_request::MoveRequest;
use crate::models::player::{PlayerIdentity, PlayerProfile};
use crate::models::queue::QueueEntry;
use crate::models::room::{Color, ColorPreference, MatchKind, Room, RoomStatus, TimeControl};
use crate::repositories::Repositories;
use crate::services::auth_service::AuthService;
use crate::services::chess_service::ChessService;
use crate::services::clock_service::ClockService;
use crate::services::connection_registry::{ConnectionRegistry, Outbound};
use crate::services::errors::SessionError;
use crate::services::matchmaking_service::{MatchmakingQueue, Pairing};
use crate::services::persistence_service::{PersistenceQueue, RetryPolicy};
use crate::services::reconnection_service::ReconnectionManager;
use crate::services::room_actor::{RoomContext, RoomHandle};
use crate::services::session_store::{CurrentRooms, SessionStore};
use crate::services::settlement_service::SettlementService;
use crate::services::suggestion_service::{MoveSuggester, SuggestionService};

/// Entry point of the orchestrator. Owns every table the realtime path
/// needs and turns client events into commands for the right component.
pub struct SessionManager {
    config: OrchestratorConfig,
    auth_service: AuthService,
    registry: Arc<ConnectionRegistry>,
    queue: MatchmakingQueue,
    store: Arc<SessionStore>,
}

impl SessionManager {
    /// Must be called inside a tokio runtime: the persistence worker is
    /// spawned here.
    pub fn new(
        config: OrchestratorConfig,
        repositories: Repositories,
        suggester: Option<Arc<dyn MoveSuggester>>,
    ) -> Self {
        let chess_service = ChessService::new();
        let registry = Arc::new(ConnectionRegistry::new(config.min_move_interval));
        let (persistence, _worker) = PersistenceQueue::start(
            repositories.clone(),
            config.persist_queue_capacity,
            RetryPolicy {
                max_attempts: config.persist_max_attempts,
                initial_backoff: config.persist_backoff,
            },
        );

        let context = Arc::new(RoomContext {
            registry: registry.clone(),
            chess_service: chess_service.clone(),
            clock_service: ClockService::new(config.clock_tick),
            reconnection: Arc::new(ReconnectionManager::new(config.grace_period)),
            settlement: SettlementService::new(chess_service.clone()),
            persistence,
            suggestions: Arc::new(SuggestionService::new(
                suggester,
                chess_service,
                config.suggestion_timeout,
            )),
            current_rooms: Arc::new(CurrentRooms::new()),
        });

        SessionManager {
            auth_service: AuthService::new(repositories.users.clone(), &config.jwt_secret),
            registry,
            queue: MatchmakingQueue::new(config.rating_window),
            store: Arc::new(SessionStore::new(context, config.retention)),
            config,
        }
    }

    pub fn auth_service(&self) -> &AuthService {
        &self.auth_service
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn queue(&self) -> &MatchmakingQueue {
        &self.queue
    }

    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.store.clone().spawn_sweeper(self.config.sweep_interval)
    }

    pub async fn register_connection(&self, connection_id: &str, sender: Outbound) {
        self.registry.register(connection_id, sender).await;
    }

    /// Handles a dropped connection. Only a connection that still holds its
    /// identity's live binding counts as that player leaving.
    pub async fn disconnect(&self, connection_id: &str) {
        let Some(identity) = self.registry.unregister(connection_id).await else {
            return;
        };
        self.queue.leave(&identity.key()).await;
        let current = self.store.current_room(&identity).await;

        for room_id in self.store.current_rooms().take_watched(&identity).await {
            if current.as_ref().map(RoomHandle::room_id) == Some(room_id.as_str()) {
                continue;
            }
            if let Ok(handle) = self.store.get(&room_id).await {
                handle.disconnected(identity.clone()).await;
            }
        }
        if let Some(handle) = current {
            handle.disconnected(identity).await;
        }
    }

    pub async fn handle_event(&self, connection_id: &str, event: ClientEvent) {
        let action = event.name();
        debug!(connection_id = %connection_id, action, "Client event");

        let result = match event {
            ClientEvent::Authenticate { token } => self.authenticate(connection_id, &token).await,
            ClientEvent::AuthenticateGuest { name, guest_id } => {
                self.authenticate_guest(connection_id, &name, guest_id.as_deref())
                    .await
            }
            ClientEvent::JoinQueue {
                match_kind,
                time_control,
                color_preference,
            } => {
                self.join_queue(connection_id, match_kind, time_control, color_preference)
                    .await
            }
            ClientEvent::LeaveQueue => self.leave_queue(connection_id).await,
            ClientEvent::CreateRoom {
                match_kind,
                time_control,
                color_preference,
                is_private,
                ai_difficulty,
            } => {
                self.create_room(
                    connection_id,
                    match_kind,
                    time_control,
                    color_preference,
                    is_private,
                    ai_difficulty,
                )
                .await
            }
            ClientEvent::JoinRoomAsPlayer { room_id } => {
                self.join_room_as_player(connection_id, &room_id).await
            }
            ClientEvent::JoinRoom { room_id } => self.spectate(connection_id, &room_id).await,
            ClientEvent::MakeMove {
                room_id,
                from,
                to,
                promotion,
            } => {
                let request = ClientEvent::move_request(&from, &to, promotion.as_deref());
                self.make_move(connection_id, room_id.as_deref(), request)
                    .await
            }
            ClientEvent::Resign { room_id } => {
                match self.seated(connection_id, room_id.as_deref()).await {
                    Ok((profile, handle)) => handle.resign(profile.identity).await,
                    Err(e) => Err(e),
                }
            }
            ClientEvent::OfferDraw { room_id } => {
                match self.seated(connection_id, room_id.as_deref()).await {
                    Ok((profile, handle)) => handle.offer_draw(profile.identity).await,
                    Err(e) => Err(e),
                }
            }
            ClientEvent::DrawResponse { room_id, accept } => {
                match self.seated(connection_id, room_id.as_deref()).await {
                    Ok((profile, handle)) => handle.respond_draw(profile.identity, accept).await,
                    Err(e) => Err(e),
                }
            }
            ClientEvent::SendMessage { room_id, text } => {
                match self.seated(connection_id, room_id.as_deref()).await {
                    Ok((profile, handle)) => {
                        handle
                            .chat(profile.identity, profile.display_name, text)
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            ClientEvent::Ping => {
                self.registry
                    .send_to_connection(connection_id, ServerEvent::Pong)
                    .await;
                Ok(())
            }
        };

        if let Err(e) = result {
            self.report(connection_id, action, e).await;
        }
    }

    /// Errors go back to the offending connection only. Rate-limited moves
    /// are dropped without a reply.
    async fn report(&self, connection_id: &str, action: &str, error: SessionError) {
        let event = match &error {
            SessionError::RateLimited => {
                debug!(connection_id = %connection_id, action, "Rate limited, dropping event");
                return;
            }
            SessionError::Authentication(message) => ServerEvent::AuthenticationError {
                message: message.clone(),
            },
            SessionError::Validation(message) if action == "make_move" => {
                ServerEvent::InvalidMove {
                    message: message.clone(),
                }
            }
            SessionError::ExternalService(_) | SessionError::Persistence(_) => {
                warn!(connection_id = %connection_id, action, error = %error, "Request failed");
                ServerEvent::Error {
                    code: error.code().to_string(),
                    message: error.message(),
                }
            }
            _ => ServerEvent::Error {
                code: error.code().to_string(),
                message: error.message(),
            },
        };
        debug!(connection_id = %connection_id, action, error = %error, "Rejected client event");
        self.registry.send_to_connection(connection_id, event).await;
    }

    async fn profile(&self, connection_id: &str) -> Result<PlayerProfile, SessionError> {
        self.registry
            .profile(connection_id)
            .await
            .ok_or_else(|| SessionError::Authentication("Not authenticated".to_string()))
    }

    /// Resolves the room an event targets: the explicit id, or the
    /// sender's current room.
    async fn target_room(
        &self,
        identity: &PlayerIdentity,
        room_id: Option<&str>,
    ) -> Result<RoomHandle, SessionError> {
        match room_id {
            Some(room_id) => self.store.get(room_id).await,
            None => self
                .store
                .current_room(identity)
                .await
                .ok_or_else(|| SessionError::NotFound("You are not in a room".to_string())),
        }
    }

    async fn seated(
        &self,
        connection_id: &str,
        room_id: Option<&str>,
    ) -> Result<(PlayerProfile, RoomHandle), SessionError> {
        let profile = self.profile(connection_id).await?;
        let handle = self.target_room(&profile.identity, room_id).await?;
        Ok((profile, handle))
    }

    async fn authenticate(&self, connection_id: &str, token: &str) -> Result<(), SessionError> {
        let profile = self.auth_service.authenticate_account(token).await?;
        self.bind(connection_id, profile).await;
        Ok(())
    }

    async fn authenticate_guest(
        &self,
        connection_id: &str,
        name: &str,
        guest_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let profile = self.auth_service.authenticate_guest(name, guest_id)?;
        self.bind(connection_id, profile).await;
        Ok(())
    }

    /// Binds the identity and resumes its live room, if it has one. A game
    /// that ended while it was offline is replayed as a final snapshot.
    async fn bind(&self, connection_id: &str, profile: PlayerProfile) {
        let identity = profile.identity.clone();
        let player_id = match &identity {
            PlayerIdentity::Account(id) | PlayerIdentity::Guest(id) => id.clone(),
            PlayerIdentity::Engine => "engine".to_string(),
        };
        let authenticated = ServerEvent::Authenticated {
            player_id,
            display_name: profile.display_name.clone(),
            is_guest: identity.is_guest(),
            rating: profile.rating,
        };
        self.registry.bind(connection_id, profile).await;
        self.registry
            .send_to_connection(connection_id, authenticated)
            .await;
        info!(connection_id = %connection_id, player = %identity.key(), "Authenticated");

        if let Some(handle) = self.store.current_room(&identity).await {
            if let Err(e) = handle.reconnected(identity).await {
                debug!(room_id = %handle.room_id(), error = %e, "Room gone before reconnect");
            }
        } else if let Some(room_id) = self.store.current_rooms().take_held_result(&identity).await {
            self.replay_result(connection_id, &room_id).await;
        }
    }

    async fn replay_result(&self, connection_id: &str, room_id: &str) {
        let room = match self.store.get(room_id).await {
            Ok(handle) => handle.snapshot().await,
            Err(e) => Err(e),
        };
        match room {
            Ok(room) => {
                self.registry
                    .send_to_connection(
                        connection_id,
                        ServerEvent::RoomUpdate {
                            room: Box::new(room),
                        },
                    )
                    .await;
            }
            Err(e) => debug!(room_id = %room_id, error = %e, "Finished room already evicted"),
        }
    }

    /// Enforces one current room per identity: a waiting room is abandoned
    /// in favour of the new action, a game in progress blocks it.
    async fn ensure_available(&self, identity: &PlayerIdentity) -> Result<(), SessionError> {
        let Some(handle) = self.store.current_room(identity).await else {
            return Ok(());
        };
        let room = match handle.snapshot().await {
            Ok(room) => room,
            Err(_) => {
                self.store
                    .current_rooms()
                    .release(identity, handle.room_id())
                    .await;
                return Ok(());
            }
        };

        match room.status {
            RoomStatus::Waiting => {
                if handle.abandon_if_waiting().await? {
                    Ok(())
                } else {
                    Err(already_playing(&room.room_id))
                }
            }
            RoomStatus::InProgress | RoomStatus::Paused => Err(already_playing(&room.room_id)),
            RoomStatus::Finished | RoomStatus::Abandoned => {
                self.store
                    .current_rooms()
                    .release(identity, &room.room_id)
                    .await;
                Ok(())
            }
        }
    }

    async fn join_queue(
        &self,
        connection_id: &str,
        match_kind: MatchKind,
        time_control: TimeControl,
        color_preference: ColorPreference,
    ) -> Result<(), SessionError> {
        let profile = self.profile(connection_id).await?;
        if match_kind == MatchKind::Ai {
            return Err(SessionError::Validation(
                "AI games are created directly, not queued".to_string(),
            ));
        }
        profile.identity.ensure_eligible(match_kind)?;
        time_control.validate()?;
        self.ensure_available(&profile.identity).await?;

        let entry = QueueEntry::new(profile, match_kind, time_control, color_preference);
        let pairing = self.queue.enqueue(entry).await?;
        self.registry
            .send_to_connection(
                connection_id,
                ServerEvent::QueueJoined {
                    match_kind,
                    time_control,
                },
            )
            .await;

        if let Some(pairing) = pairing {
            self.open_matched_room(pairing).await?;
        }
        Ok(())
    }

    async fn open_matched_room(&self, pairing: Pairing) -> Result<(), SessionError> {
        let Pairing { white, black } = pairing;
        let mut room = Room::new(
            &white.player,
            Color::White,
            white.match_kind,
            white.time_control,
            false,
            ChessService::initial_hash(),
        );
        room.seat(&black.player)?;
        let room_id = room.room_id.clone();
        let pending = self.store.open(room).await;

        for (me, opponent, color) in [
            (&white, &black, Color::White),
            (&black, &white, Color::Black),
        ] {
            self.registry
                .send(
                    &me.player.identity,
                    ServerEvent::MatchFound {
                        room_id: room_id.clone(),
                        color,
                        opponent_name: opponent.player.display_name.clone(),
                        opponent_rating: opponent.rating,
                    },
                )
                .await;
        }
        pending.start();
        Ok(())
    }

    async fn leave_queue(&self, connection_id: &str) -> Result<(), SessionError> {
        let profile = self.profile(connection_id).await?;
        self.queue.leave(&profile.identity.key()).await;
        self.registry
            .send_to_connection(connection_id, ServerEvent::QueueLeft)
            .await;
        Ok(())
    }

    async fn create_room(
        &self,
        connection_id: &str,
        match_kind: MatchKind,
        time_control: TimeControl,
        color_preference: ColorPreference,
        is_private: bool,
        ai_difficulty: Option<u8>,
    ) -> Result<(), SessionError> {
        let profile = self.profile(connection_id).await?;
        profile.identity.ensure_eligible(match_kind)?;
        time_control.validate()?;
        self.ensure_available(&profile.identity).await?;
        self.queue.leave(&profile.identity.key()).await;

        let color = match color_preference {
            ColorPreference::White => Color::White,
            ColorPreference::Black => Color::Black,
            ColorPreference::Random => {
                if rand::thread_rng().gen_bool(0.5) {
                    Color::White
                } else {
                    Color::Black
                }
            }
        };
        let mut room = Room::new(
            &profile,
            color,
            match_kind,
            time_control,
            is_private,
            ChessService::initial_hash(),
        );
        if match_kind == MatchKind::Ai {
            let difficulty = SuggestionService::clamp_difficulty(ai_difficulty);
            room.ai_difficulty = Some(difficulty);
            room.seat(&PlayerProfile::engine(difficulty))?;
        }

        info!(
            room_id = %room.room_id,
            player = %profile.identity.key(),
            kind = ?match_kind,
            "Room created"
        );
        let room_created = ServerEvent::RoomCreated {
            room: Box::new(room.clone()),
        };
        let pending = self.store.open(room).await;
        self.registry
            .send_to_connection(connection_id, room_created)
            .await;
        pending.start();
        Ok(())
    }

    async fn join_room_as_player(
        &self,
        connection_id: &str,
        room_id: &str,
    ) -> Result<(), SessionError> {
        let profile = self.profile(connection_id).await?;
        if self.store.current_rooms().get(&profile.identity).await.as_deref() == Some(room_id) {
            return Err(SessionError::StateConflict(
                "Already seated in this room".to_string(),
            ));
        }
        let handle = self.store.get(room_id).await?;
        // Rejected joins must leave the caller's own waiting room untouched.
        handle.snapshot().await?.seat(&profile)?;
        self.ensure_available(&profile.identity).await?;
        self.queue.leave(&profile.identity.key()).await;

        handle.join(profile).await?;
        Ok(())
    }

    async fn spectate(&self, connection_id: &str, room_id: &str) -> Result<(), SessionError> {
        let profile = self.profile(connection_id).await?;
        let handle = self.store.get(room_id).await?;
        let room = handle.spectate(profile.identity.clone()).await?;
        if room.slot_for(&profile.identity).is_none() {
            self.store
                .current_rooms()
                .watch(&profile.identity, room_id)
                .await;
        }
        self.registry
            .send_to_connection(
                connection_id,
                ServerEvent::RoomUpdate {
                    room: Box::new(room),
                },
            )
            .await;
        Ok(())
    }

    async fn make_move(
        &self,
        connection_id: &str,
        room_id: Option<&str>,
        request: MoveRequest,
    ) -> Result<(), SessionError> {
        let (profile, handle) = self.seated(connection_id, room_id).await?;
        self.registry.admit_move(connection_id).await?;
        handle.make_move(profile.identity, request).await
    }
}

fn already_playing(room_id: &str) -> SessionError {
    SessionError::StateConflict(format!("Already playing in room {}", room_id))
}
