use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde_dynamo::{from_item, to_item};
use tokio::sync::RwLock;

use crate::models::match_history::MatchHistory;
use crate::repositories::errors::RepositoryError;

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MatchHistoryRepository: Send + Sync {
    /// Records are write-once: inserting an existing id is a no-op.
    async fn create_record(&self, record: &MatchHistory) -> Result<(), RepositoryError>;
    async fn get_records_for_player(
        &self,
        player_id: &str,
    ) -> Result<Vec<MatchHistory>, RepositoryError>;
}

pub struct DynamoDbMatchHistoryRepository {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbMatchHistoryRepository {
    pub fn new(client: Client, table_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
        }
    }
}

#[async_trait]
impl MatchHistoryRepository for DynamoDbMatchHistoryRepository {
    async fn create_record(&self, record: &MatchHistory) -> Result<(), RepositoryError> {
        let item = to_item(record).map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(history_id)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let error_str = e.to_string();
                // A retried write that already landed.
                if error_str.contains("ConditionalCheckFailedException") {
                    Ok(())
                } else {
                    Err(RepositoryError::DynamoDb(error_str))
                }
            }
        }
    }

    async fn get_records_for_player(
        &self,
        player_id: &str,
    ) -> Result<Vec<MatchHistory>, RepositoryError> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name("GSI_HistoryByPlayer")
            .key_condition_expression("player_id = :player_id")
            .expression_attribute_values(":player_id", AttributeValue::S(player_id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|item| from_item(item).map_err(|e| RepositoryError::Serialization(e.to_string())))
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryMatchHistoryRepository {
    records: RwLock<HashMap<String, MatchHistory>>,
}

impl InMemoryMatchHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchHistoryRepository for InMemoryMatchHistoryRepository {
    async fn create_record(&self, record: &MatchHistory) -> Result<(), RepositoryError> {
        self.records
            .write()
            .await
            .entry(record.history_id.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn get_records_for_player(
        &self,
        player_id: &str,
    ) -> Result<Vec<MatchHistory>, RepositoryError> {
        let mut records: Vec<MatchHistory> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.player_id == player_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.played_at);
        Ok(records)
    }
}
