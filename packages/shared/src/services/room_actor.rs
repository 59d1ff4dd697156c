use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::models::match_history::RatingChange;
use crate::models::messages::ServerEvent;
use crate::models::move_request::MoveRequest;
use crate::models::player::{PlayerIdentity, PlayerProfile};
use crate::models::room::{
    Color, EndReason, GameOutcome, MoveRecord, Room, RoomStatus,
};
use crate::services::chess_service::ChessService;
use crate::services::clock_service::{ClockService, GameClock};
use crate::services::connection_registry::ConnectionRegistry;
use crate::services::errors::SessionError;
use crate::services::persistence_service::{PersistJob, PersistenceQueue};
use crate::services::reconnection_service::ReconnectionManager;
use crate::services::session_store::CurrentRooms;
use crate::services::settlement_service::SettlementService;
use crate::services::suggestion_service::SuggestionService;
use crate::services::timer::TimerHandle;

const MAILBOX_CAPACITY: usize = 64;
const MAX_CHAT_LENGTH: usize = 500;

/// Collaborators shared by every room actor.
pub struct RoomContext {
    pub registry: Arc<ConnectionRegistry>,
    pub chess_service: ChessService,
    pub clock_service: ClockService,
    pub reconnection: Arc<ReconnectionManager>,
    pub settlement: SettlementService,
    pub persistence: PersistenceQueue,
    pub suggestions: Arc<SuggestionService>,
    pub current_rooms: Arc<CurrentRooms>,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

pub enum RoomCommand {
    Join {
        profile: PlayerProfile,
        reply: Reply<Color>,
    },
    Spectate {
        identity: PlayerIdentity,
        reply: Reply<Room>,
    },
    Move {
        identity: PlayerIdentity,
        request: MoveRequest,
        reply: Reply<()>,
    },
    Resign {
        identity: PlayerIdentity,
        reply: Reply<()>,
    },
    OfferDraw {
        identity: PlayerIdentity,
        reply: Reply<()>,
    },
    RespondDraw {
        identity: PlayerIdentity,
        accept: bool,
        reply: Reply<()>,
    },
    Chat {
        identity: PlayerIdentity,
        display_name: String,
        text: String,
        reply: Reply<()>,
    },
    Disconnected {
        identity: PlayerIdentity,
    },
    Reconnected {
        identity: PlayerIdentity,
        reply: Reply<Option<Room>>,
    },
    Snapshot {
        reply: Reply<Room>,
    },
    AbandonIfWaiting {
        reply: Reply<bool>,
    },
    /// Asks the room whether it may be evicted; `true` means the actor has
    /// stopped.
    Expire {
        retention: Duration,
        reply: Reply<bool>,
    },
    ClockTick,
    GraceExpired {
        identity: PlayerIdentity,
    },
    EngineMove {
        ply: u32,
        request: MoveRequest,
    },
}

/// Address of a running room actor.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: String,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| SessionError::room_not_found(&self.room_id))?;
        response
            .await
            .map_err(|_| SessionError::room_not_found(&self.room_id))?
    }

    pub async fn join(&self, profile: PlayerProfile) -> Result<Color, SessionError> {
        self.request(|reply| RoomCommand::Join { profile, reply }).await
    }

    pub async fn spectate(&self, identity: PlayerIdentity) -> Result<Room, SessionError> {
        self.request(|reply| RoomCommand::Spectate { identity, reply })
            .await
    }

    pub async fn make_move(
        &self,
        identity: PlayerIdentity,
        request: MoveRequest,
    ) -> Result<(), SessionError> {
        self.request(|reply| RoomCommand::Move {
            identity,
            request,
            reply,
        })
        .await
    }

    pub async fn resign(&self, identity: PlayerIdentity) -> Result<(), SessionError> {
        self.request(|reply| RoomCommand::Resign { identity, reply })
            .await
    }

    pub async fn offer_draw(&self, identity: PlayerIdentity) -> Result<(), SessionError> {
        self.request(|reply| RoomCommand::OfferDraw { identity, reply })
            .await
    }

    pub async fn respond_draw(
        &self,
        identity: PlayerIdentity,
        accept: bool,
    ) -> Result<(), SessionError> {
        self.request(|reply| RoomCommand::RespondDraw {
            identity,
            accept,
            reply,
        })
        .await
    }

    pub async fn chat(
        &self,
        identity: PlayerIdentity,
        display_name: String,
        text: String,
    ) -> Result<(), SessionError> {
        self.request(|reply| RoomCommand::Chat {
            identity,
            display_name,
            text,
            reply,
        })
        .await
    }

    pub async fn disconnected(&self, identity: PlayerIdentity) {
        if self
            .sender
            .send(RoomCommand::Disconnected { identity })
            .await
            .is_err()
        {
            debug!(room_id = %self.room_id, "Disconnect for a stopped room");
        }
    }

    pub async fn reconnected(&self, identity: PlayerIdentity) -> Result<Option<Room>, SessionError> {
        self.request(|reply| RoomCommand::Reconnected { identity, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<Room, SessionError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    pub async fn abandon_if_waiting(&self) -> Result<bool, SessionError> {
        self.request(|reply| RoomCommand::AbandonIfWaiting { reply })
            .await
    }

    pub async fn expire(&self, retention: Duration) -> Result<bool, SessionError> {
        self.request(|reply| RoomCommand::Expire { retention, reply })
            .await
    }
}

/// A room whose actor is built but not yet running. Commands sent to its
/// handle queue in the mailbox until `start`.
#[must_use]
pub struct PendingRoom {
    handle: RoomHandle,
    actor: RoomActor,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl PendingRoom {
    pub fn handle(&self) -> &RoomHandle {
        &self.handle
    }

    /// Every mutation of the room goes through the mailbox from here on,
    /// one command at a time.
    pub fn start(self) -> RoomHandle {
        tokio::spawn(self.actor.run(self.receiver));
        self.handle
    }
}

pub fn prepare_room(room: Room, context: Arc<RoomContext>) -> PendingRoom {
    let (sender, receiver) = mpsc::channel(MAILBOX_CAPACITY);
    let handle = RoomHandle {
        room_id: room.room_id.clone(),
        sender: sender.clone(),
    };
    let actor = RoomActor {
        room,
        context,
        sender: sender.downgrade(),
        clock: None,
        ticker: None,
        last_activity: Instant::now(),
    };
    PendingRoom {
        handle,
        actor,
        receiver,
    }
}

struct RoomActor {
    room: Room,
    context: Arc<RoomContext>,
    sender: mpsc::WeakSender<RoomCommand>,
    clock: Option<GameClock>,
    ticker: Option<TimerHandle>,
    last_activity: Instant,
}

impl RoomActor {
    async fn run(mut self, mut receiver: mpsc::Receiver<RoomCommand>) {
        info!(room_id = %self.room.room_id, kind = ?self.room.match_kind, "Room opened");
        self.persist();
        if self.room.status == RoomStatus::InProgress {
            self.on_game_started().await;
        }

        while let Some(command) = receiver.recv().await {
            if self.handle(command).await {
                break;
            }
        }

        self.stop_clock();
        self.context
            .reconnection
            .cancel_room(&self.room.room_id)
            .await;
        info!(room_id = %self.room.room_id, "Room closed");
    }

    /// Returns true when the actor should stop.
    async fn handle(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::Join { profile, reply } => {
                self.touch();
                let result = self.join(profile).await;
                let _ = reply.send(result);
            }
            RoomCommand::Spectate { identity, reply } => {
                self.touch();
                if self.room.slot_for(&identity).is_none() && !self.room.spectators.contains(&identity) {
                    self.room.spectators.push(identity);
                }
                let _ = reply.send(Ok(self.room.clone()));
            }
            RoomCommand::Move {
                identity,
                request,
                reply,
            } => {
                self.touch();
                let result = self.make_move(&identity, &request).await;
                let _ = reply.send(result);
            }
            RoomCommand::Resign { identity, reply } => {
                self.touch();
                let result = self.resign(&identity).await;
                let _ = reply.send(result);
            }
            RoomCommand::OfferDraw { identity, reply } => {
                self.touch();
                let result = self.offer_draw(&identity).await;
                let _ = reply.send(result);
            }
            RoomCommand::RespondDraw {
                identity,
                accept,
                reply,
            } => {
                self.touch();
                let result = self.respond_draw(&identity, accept).await;
                let _ = reply.send(result);
            }
            RoomCommand::Chat {
                identity,
                display_name,
                text,
                reply,
            } => {
                self.touch();
                let result = self.chat(&identity, display_name, &text).await;
                let _ = reply.send(result);
            }
            RoomCommand::Disconnected { identity } => {
                self.touch();
                self.disconnected(identity).await;
            }
            RoomCommand::Reconnected { identity, reply } => {
                self.touch();
                let result = self.reconnected(&identity).await;
                let _ = reply.send(Ok(result));
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(self.room.clone()));
            }
            RoomCommand::AbandonIfWaiting { reply } => {
                let abandoned = self.room.status == RoomStatus::Waiting;
                if abandoned {
                    self.abandon().await;
                }
                let _ = reply.send(Ok(abandoned));
            }
            RoomCommand::Expire { retention, reply } => {
                let expired = self.expire(retention).await;
                let _ = reply.send(Ok(expired));
                return expired;
            }
            RoomCommand::ClockTick => self.tick().await,
            RoomCommand::GraceExpired { identity } => self.grace_expired(identity).await,
            RoomCommand::EngineMove { ply, request } => self.engine_move(ply, request).await,
        }
        false
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn persist(&self) {
        self.context
            .persistence
            .enqueue(PersistJob::SaveRoom(Box::new(self.room.clone())));
    }

    async fn broadcast(&self, event: ServerEvent) {
        self.context
            .registry
            .broadcast(&self.room.participants(), &event)
            .await;
    }

    async fn broadcast_except(&self, excluded: &PlayerIdentity, event: ServerEvent) {
        let recipients: Vec<PlayerIdentity> = self
            .room
            .participants()
            .into_iter()
            .filter(|identity| identity != excluded)
            .collect();
        self.context.registry.broadcast(&recipients, &event).await;
    }

    async fn join(&mut self, profile: PlayerProfile) -> Result<Color, SessionError> {
        let color = self.room.seat(&profile)?;
        self.context
            .current_rooms
            .assign(&profile.identity, &self.room.room_id)
            .await;
        info!(
            room_id = %self.room.room_id,
            player = %profile.identity.key(),
            color = color.as_str(),
            "Player seated"
        );
        self.persist();
        self.on_game_started().await;
        Ok(color)
    }

    async fn on_game_started(&mut self) {
        if let Some(bank) = self.room.time_control.bank_ms() {
            let white = self.time_left(Color::White).unwrap_or(bank);
            let black = self.time_left(Color::Black).unwrap_or(bank);
            self.clock = Some(GameClock::resume(white, black));
            if let Some(sender) = self.sender.upgrade() {
                self.ticker = Some(
                    self.context
                        .clock_service
                        .start(sender, || RoomCommand::ClockTick),
                );
            }
        }
        self.broadcast(ServerEvent::GameStarted {
            room: Box::new(self.room.clone()),
        })
        .await;
        self.request_engine_move_if_due();
    }

    fn stop_clock(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    /// Debits the side on turn and mirrors both banks into the slots.
    /// Returns that side's remaining time.
    fn charge_clock(&mut self) -> Option<u64> {
        let turn = self.room.current_turn;
        let clock = self.clock.as_mut()?;
        let left = clock.charge(turn, Instant::now());
        for color in [Color::White, Color::Black] {
            let remaining = clock.remaining(color);
            if let Some(slot) = self.room.slot_by_color_mut(color) {
                slot.time_left_ms = Some(remaining);
            }
        }
        Some(left)
    }

    fn time_left(&self, color: Color) -> Option<u64> {
        self.room.slot_by_color(color).and_then(|slot| slot.time_left_ms)
    }

    fn seated_color(&self, identity: &PlayerIdentity) -> Result<Color, SessionError> {
        self.room
            .color_of(identity)
            .ok_or_else(|| SessionError::Validation("You are not a player in this room".to_string()))
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        if self.room.status != RoomStatus::InProgress {
            return Err(SessionError::Validation(
                "Game is not in progress".to_string(),
            ));
        }
        Ok(())
    }

    async fn make_move(
        &mut self,
        identity: &PlayerIdentity,
        request: &MoveRequest,
    ) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        let color = self.seated_color(identity)?;
        if color != self.room.current_turn {
            return Err(SessionError::Validation("Not your turn".to_string()));
        }

        let applied = self.context.chess_service.apply_move(
            &self.room.position,
            request,
            self.room.halfmove_clock,
            &self.room.position_hashes,
            self.room.move_log.len() as u32 + 1,
        )?;

        if self.charge_clock() == Some(0) {
            self.finish(GameOutcome {
                winner: Some(color.opposite()),
                reason: EndReason::Timeout,
            })
            .await;
            return Err(SessionError::Validation("Time has run out".to_string()));
        }

        let record = MoveRecord {
            move_number: self.room.move_log.len() as u32 + 1,
            color,
            from: request.from_square.to_ascii_lowercase(),
            to: request.to_square.to_ascii_lowercase(),
            promotion: request.promotion_piece.as_ref().map(|p| p.to_ascii_lowercase()),
            piece: applied.piece.clone(),
            san: applied.san.clone(),
            fen_after: applied.fen.clone(),
            time_left_ms: self.time_left(color),
            played_at: Utc::now(),
        };

        self.room.position = applied.fen;
        self.room.position_hashes.push(applied.hash);
        self.room.halfmove_clock = applied.halfmove_clock;
        self.room.current_turn = color.opposite();
        self.room.draw_offer = None;
        self.room.move_log.push(record.clone());
        self.room.touch();

        debug!(room_id = %self.room.room_id, san = %record.san, "Move applied");
        self.broadcast(ServerEvent::MoveMade {
            room_id: self.room.room_id.clone(),
            record,
            position: self.room.position.clone(),
            current_turn: self.room.current_turn,
            white_time_ms: self.time_left(Color::White),
            black_time_ms: self.time_left(Color::Black),
        })
        .await;
        self.persist();

        match applied.terminal {
            Some(outcome) => self.finish(outcome).await,
            None => self.request_engine_move_if_due(),
        }
        Ok(())
    }

    async fn resign(&mut self, identity: &PlayerIdentity) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        let color = self.seated_color(identity)?;
        self.charge_clock();
        self.finish(GameOutcome {
            winner: Some(color.opposite()),
            reason: EndReason::Resignation,
        })
        .await;
        Ok(())
    }

    async fn offer_draw(&mut self, identity: &PlayerIdentity) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        let color = self.seated_color(identity)?;

        match self.room.draw_offer {
            Some(offered_by) if offered_by == color => Ok(()),
            Some(_) => {
                self.charge_clock();
                self.finish(GameOutcome {
                    winner: None,
                    reason: EndReason::Agreement,
                })
                .await;
                Ok(())
            }
            None => {
                let room_id = self.room.room_id.clone();
                if self.room.engine_color() == Some(color.opposite()) {
                    self.context
                        .registry
                        .send(identity, ServerEvent::DrawDeclined { room_id })
                        .await;
                    return Ok(());
                }
                self.room.draw_offer = Some(color);
                self.persist();
                self.broadcast_except(
                    identity,
                    ServerEvent::DrawOffered { room_id, by: color },
                )
                .await;
                Ok(())
            }
        }
    }

    async fn respond_draw(
        &mut self,
        identity: &PlayerIdentity,
        accept: bool,
    ) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        let color = self.seated_color(identity)?;
        if self.room.draw_offer != Some(color.opposite()) {
            return Err(SessionError::Validation(
                "No draw offer to respond to".to_string(),
            ));
        }

        if accept {
            self.charge_clock();
            self.finish(GameOutcome {
                winner: None,
                reason: EndReason::Agreement,
            })
            .await;
        } else {
            self.room.draw_offer = None;
            self.persist();
            if let Some(offerer) = self.room.slot_by_color(color.opposite()) {
                self.context
                    .registry
                    .send(
                        &offerer.identity,
                        ServerEvent::DrawDeclined {
                            room_id: self.room.room_id.clone(),
                        },
                    )
                    .await;
            }
        }
        Ok(())
    }

    async fn chat(
        &mut self,
        identity: &PlayerIdentity,
        display_name: String,
        text: &str,
    ) -> Result<(), SessionError> {
        if !self.room.participants().contains(identity) {
            return Err(SessionError::Validation(
                "You are not in this room".to_string(),
            ));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::Validation("Message is empty".to_string()));
        }
        if text.chars().count() > MAX_CHAT_LENGTH {
            return Err(SessionError::Validation(format!(
                "Message exceeds {} characters",
                MAX_CHAT_LENGTH
            )));
        }

        self.broadcast(ServerEvent::ChatMessage {
            room_id: self.room.room_id.clone(),
            from: display_name,
            text: text.to_string(),
            sent_at: Utc::now(),
        })
        .await;
        Ok(())
    }

    async fn disconnected(&mut self, identity: PlayerIdentity) {
        if self.room.spectators.contains(&identity) {
            self.room.spectators.retain(|s| s != &identity);
            return;
        }
        let Some(slot) = self.room.slot_for_mut(&identity) else {
            return;
        };
        slot.connected = false;

        if self.room.status != RoomStatus::InProgress {
            return;
        }
        let grace = self.context.reconnection.grace_period();
        if let Some(sender) = self.sender.upgrade() {
            self.context
                .reconnection
                .start(
                    &self.room.room_id,
                    &identity.key(),
                    sender,
                    RoomCommand::GraceExpired {
                        identity: identity.clone(),
                    },
                )
                .await;
        }
        info!(
            room_id = %self.room.room_id,
            player = %identity.key(),
            grace_secs = grace.as_secs(),
            "Player disconnected, grace period started"
        );
        self.persist();
        self.broadcast_except(
            &identity,
            ServerEvent::OpponentDisconnected {
                room_id: self.room.room_id.clone(),
                grace_seconds: grace.as_secs(),
            },
        )
        .await;
    }

    async fn reconnected(&mut self, identity: &PlayerIdentity) -> Option<Room> {
        if self.room.status.is_terminal() {
            return None;
        }
        let slot = self.room.slot_for_mut(identity)?;
        let was_disconnected = !slot.connected;
        slot.connected = true;

        self.context
            .reconnection
            .cancel(&self.room.room_id, &identity.key())
            .await;
        if self.room.status == RoomStatus::InProgress {
            self.charge_clock();
        }
        info!(room_id = %self.room.room_id, player = %identity.key(), "Player reconnected");

        self.context
            .registry
            .send(
                identity,
                ServerEvent::GameReconnected {
                    room: Box::new(self.room.clone()),
                },
            )
            .await;
        if was_disconnected && self.room.status == RoomStatus::InProgress {
            self.persist();
            self.broadcast_except(
                identity,
                ServerEvent::OpponentReconnected {
                    room_id: self.room.room_id.clone(),
                },
            )
            .await;
        }
        Some(self.room.clone())
    }

    async fn grace_expired(&mut self, identity: PlayerIdentity) {
        self.context
            .reconnection
            .cancel(&self.room.room_id, &identity.key())
            .await;
        if self.room.status != RoomStatus::InProgress {
            return;
        }
        let Some(slot) = self.room.slot_for(&identity) else {
            return;
        };
        if slot.connected {
            return;
        }
        let color = slot.color;
        info!(room_id = %self.room.room_id, player = %identity.key(), "Grace period expired");
        self.charge_clock();
        self.finish(GameOutcome {
            winner: Some(color.opposite()),
            reason: EndReason::Abandonment,
        })
        .await;
    }

    async fn tick(&mut self) {
        if self.room.status != RoomStatus::InProgress {
            return;
        }
        let Some(left) = self.charge_clock() else {
            return;
        };
        self.broadcast(ServerEvent::TimeUpdate {
            room_id: self.room.room_id.clone(),
            current_turn: self.room.current_turn,
            white_time_ms: self.time_left(Color::White),
            black_time_ms: self.time_left(Color::Black),
        })
        .await;
        if left == 0 {
            self.finish(GameOutcome {
                winner: Some(self.room.current_turn.opposite()),
                reason: EndReason::Timeout,
            })
            .await;
        }
    }

    fn request_engine_move_if_due(&self) {
        if self.room.status != RoomStatus::InProgress
            || self.room.engine_color() != Some(self.room.current_turn)
        {
            return;
        }
        let Some(sender) = self.sender.upgrade() else {
            return;
        };
        let suggestions = self.context.suggestions.clone();
        let fen = self.room.position.clone();
        let difficulty = SuggestionService::clamp_difficulty(self.room.ai_difficulty);
        let ply = self.room.move_log.len() as u32 + 1;
        let room_id = self.room.room_id.clone();

        tokio::spawn(async move {
            match suggestions.choose_move(&fen, difficulty).await {
                Ok(request) => {
                    let _ = sender.send(RoomCommand::EngineMove { ply, request }).await;
                }
                Err(e) => error!(room_id = %room_id, error = %e, "Engine could not move"),
            }
        });
    }

    async fn engine_move(&mut self, ply: u32, request: MoveRequest) {
        if self.room.move_log.len() as u32 + 1 != ply {
            debug!(room_id = %self.room.room_id, ply, "Discarding stale engine move");
            return;
        }
        if let Err(e) = self.make_move(&PlayerIdentity::Engine, &request).await {
            warn!(room_id = %self.room.room_id, error = %e, "Engine move rejected");
        }
    }

    /// Single exit for every game-ending path.
    async fn finish(&mut self, outcome: GameOutcome) {
        if self.room.status.is_terminal() {
            return;
        }
        self.room.result = Some(outcome);
        self.room.draw_offer = None;
        if let Err(e) = self.room.advance(RoomStatus::Finished) {
            error!(room_id = %self.room.room_id, error = %e, "Room could not finish");
            return;
        }
        self.stop_clock();
        self.context
            .reconnection
            .cancel_room(&self.room.room_id)
            .await;

        let settlement = self.context.settlement.settle(&self.room);
        info!(
            room_id = %self.room.room_id,
            winner = ?outcome.winner,
            reason = ?outcome.reason,
            "Game finished"
        );
        self.broadcast(ServerEvent::GameEnded {
            room_id: self.room.room_id.clone(),
            result: outcome,
            position: self.room.position.clone(),
            rating_changes: settlement.rating_changes.clone(),
        })
        .await;

        self.persist();
        for record in settlement.records {
            self.context
                .persistence
                .enqueue(PersistJob::SaveHistory(Box::new(record)));
        }
        for update in settlement.account_updates {
            self.context.persistence.enqueue(PersistJob::UpdateAccount {
                account_id: update.account_id,
                result: update.result,
                rating_after: update.rating_after,
            });
        }
        self.refresh_ratings(&settlement.rating_changes).await;
        self.release_players().await;
    }

    async fn refresh_ratings(&self, changes: &[RatingChange]) {
        for change in changes {
            let identity = PlayerIdentity::Account(change.player_id.clone());
            let games_played = self
                .room
                .slot_for(&identity)
                .map(|slot| slot.games_played + 1)
                .unwrap_or(1);
            self.context
                .registry
                .update_rating(&identity, change.rating_after, games_played)
                .await;
        }
    }

    async fn release_players(&self) {
        let current_rooms = &self.context.current_rooms;
        for slot in self.room.slots() {
            current_rooms.release(&slot.identity, &self.room.room_id).await;
            if !slot.connected && self.room.status == RoomStatus::Finished {
                current_rooms.hold_result(&slot.identity, &self.room.room_id).await;
            }
        }
    }

    async fn abandon(&mut self) {
        if let Err(e) = self.room.advance(RoomStatus::Abandoned) {
            warn!(room_id = %self.room.room_id, error = %e, "Room could not be abandoned");
            return;
        }
        self.stop_clock();
        self.context
            .reconnection
            .cancel_room(&self.room.room_id)
            .await;
        info!(room_id = %self.room.room_id, "Room abandoned");
        self.persist();
        self.broadcast(ServerEvent::RoomUpdate {
            room: Box::new(self.room.clone()),
        })
        .await;
        self.release_players().await;
    }

    async fn expire(&mut self, retention: Duration) -> bool {
        if self.last_activity.elapsed() < retention {
            return false;
        }
        match self.room.status {
            RoomStatus::Finished | RoomStatus::Abandoned => true,
            RoomStatus::Waiting => {
                if !self.context.registry.is_online(&self.room.player1.identity).await {
                    self.abandon().await;
                    self.touch();
                }
                false
            }
            RoomStatus::InProgress | RoomStatus::Paused => false,
        }
    }
}
