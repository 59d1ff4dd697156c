use std::sync::Arc;

use shared::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub session_manager: Arc<SessionManager>,
}
