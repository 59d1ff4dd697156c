use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tokio::sync::RwLock;

use crate::models::room::Room;
use crate::repositories::errors::RepositoryError;

#[cfg(test)]
use mockall::automock;

/// Durable backing store for room snapshots. The live copy is always the
/// in-memory one held by the room actor.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Upserts the full snapshot.
    async fn save_room(&self, room: &Room) -> Result<(), RepositoryError>;
    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, RepositoryError>;
}

pub struct DynamoDbRoomRepository {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbRoomRepository {
    pub fn new(client: Client, table_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
        }
    }
}

#[async_trait]
impl RoomRepository for DynamoDbRoomRepository {
    async fn save_room(&self, room: &Room) -> Result<(), RepositoryError> {
        let item = serde_dynamo::to_item(room)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("room_id", AttributeValue::S(room_id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        if let Some(item) = result.item {
            let room: Room = serde_dynamo::from_item(item)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
            Ok(Some(room))
        } else {
            Ok(None)
        }
    }
}

#[derive(Default)]
pub struct InMemoryRoomRepository {
    rooms: RwLock<HashMap<String, Room>>,
}

impl InMemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn save_room(&self, room: &Room) -> Result<(), RepositoryError> {
        self.rooms
            .write()
            .await
            .insert(room.room_id.clone(), room.clone());
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, RepositoryError> {
        Ok(self.rooms.read().await.get(room_id).cloned())
    }
}
