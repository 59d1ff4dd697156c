use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod routes;
pub mod state;

use shared::config::StorageBackend;
use shared::repositories::match_history_repository::{
    DynamoDbMatchHistoryRepository, InMemoryMatchHistoryRepository,
};
use shared::repositories::room_repository::{DynamoDbRoomRepository, InMemoryRoomRepository};
use shared::repositories::user_repository::{DynamoDbUserRepository, InMemoryUserRepository};
use shared::repositories::Repositories;
use shared::services::suggestion_service::{HttpMoveSuggester, MoveSuggester};
use shared::{OrchestratorConfig, SessionManager};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();

    let config = OrchestratorConfig::from_env()?;
    let repositories = repositories(&config).await;
    let suggester = config
        .suggestion_url
        .as_deref()
        .map(|url| Arc::new(HttpMoveSuggester::new(url)) as Arc<dyn MoveSuggester>);

    let bind_address = config.bind_address.clone();
    let session_manager = Arc::new(SessionManager::new(config, repositories, suggester));
    let _sweeper = session_manager.spawn_sweeper();

    let app_state = state::AppState { session_manager };

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(routes::websocket::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let listener = TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "Session orchestrator listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// `RUST_LOG` picks the filter, `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn repositories(config: &OrchestratorConfig) -> Repositories {
    match config.storage_backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Repositories {
                rooms: Arc::new(InMemoryRoomRepository::new()),
                history: Arc::new(InMemoryMatchHistoryRepository::new()),
                users: Arc::new(InMemoryUserRepository::new()),
            }
        }
        StorageBackend::DynamoDb => {
            let aws_config = aws_config::load_from_env().await;
            let client = aws_sdk_dynamodb::Client::new(&aws_config);
            info!(
                rooms = %config.rooms_table,
                history = %config.match_history_table,
                users = %config.users_table,
                "Using DynamoDB storage"
            );
            Repositories {
                rooms: Arc::new(DynamoDbRoomRepository::new(
                    client.clone(),
                    &config.rooms_table,
                )),
                history: Arc::new(DynamoDbMatchHistoryRepository::new(
                    client.clone(),
                    &config.match_history_table,
                )),
                users: Arc::new(DynamoDbUserRepository::new(client, &config.users_table)),
            }
        }
    }
}
