use axum::http::StatusCode;

/// Liveness check for the orchestrator process
pub async fn health_check() -> (StatusCode, String) {
    (StatusCode::OK, "Healthy!".to_string())
}
