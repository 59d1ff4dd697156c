pub mod match_history;
pub mod messages;
pub mod move_request;
pub mod player;
pub mod queue;
pub mod room;
pub mod user;
