pub mod config;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::OrchestratorConfig;
pub use services::session_manager::SessionManager;
