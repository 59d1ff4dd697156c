pub mod auth_service;
pub mod chess_service;
pub mod clock_service;
pub mod connection_registry;
pub mod errors;
pub mod matchmaking_service;
pub mod persistence_service;
pub mod reconnection_service;
pub mod room_actor;
pub mod session_manager;
pub mod session_store;
pub mod settlement_service;
pub mod suggestion_service;
pub mod timer;
