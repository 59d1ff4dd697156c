pub mod errors;
pub mod match_history_repository;
pub mod room_repository;
pub mod user_repository;

use std::sync::Arc;

use match_history_repository::MatchHistoryRepository;
use room_repository::RoomRepository;
use user_repository::UserRepository;

/// The durable stores the orchestrator writes to.
#[derive(Clone)]
pub struct Repositories {
    pub rooms: Arc<dyn RoomRepository>,
    pub history: Arc<dyn MatchHistoryRepository>,
    pub users: Arc<dyn UserRepository>,
}
