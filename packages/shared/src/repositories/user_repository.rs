use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use serde_dynamo::{from_item, to_attribute_value, to_item};
use tokio::sync::RwLock;

use crate::models::user::User;
use crate::repositories::errors::RepositoryError;

#[cfg(test)]
use mockall::automock;

pub struct DynamoDbUserRepository {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbUserRepository {
    pub fn new(client: Client, table_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<(), RepositoryError>;
    async fn get_user_by_id(&self, user_id: &str) -> Result<User, RepositoryError>;
    async fn update_user(&self, user: &User) -> Result<(), RepositoryError>;
}

#[async_trait]
impl UserRepository for DynamoDbUserRepository {
    async fn create_user(&self, user: &User) -> Result<(), RepositoryError> {
        let item = to_item(user).map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;
        Ok(())
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<User, RepositoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(
                "id",
                to_attribute_value(user_id)
                    .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
            )
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;
        if let Some(item) = output.item {
            let user: User =
                from_item(item).map_err(|e| RepositoryError::Serialization(e.to_string()))?;
            Ok(user)
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn update_user(&self, user: &User) -> Result<(), RepositoryError> {
        let item = to_item(user).map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_exists(id)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let error_str = e.to_string();
                if error_str.contains("ConditionalCheckFailedException") {
                    Err(RepositoryError::NotFound)
                } else {
                    Err(RepositoryError::DynamoDb(error_str))
                }
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create_user(&self, user: &User) -> Result<(), RepositoryError> {
        self.users.write().await.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<User, RepositoryError> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_user(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}
