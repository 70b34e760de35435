use super::super::errors::DatabaseError;
use super::super::types::{Client, NewClient};
use super::super::DatabaseService;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn list_clients(&self, owner_id: Uuid) -> Result<Vec<Client>, DatabaseError>;

    async fn insert_client(&self, client: NewClient) -> Result<Uuid, DatabaseError>;
}

#[async_trait]
impl ClientStore for DatabaseService {
    async fn list_clients(&self, owner_id: Uuid) -> Result<Vec<Client>, DatabaseError> {
        let response = self
            .client
            .from("clients")
            .select("*")
            .eq("owner_id", owner_id.to_string())
            .order("name.asc")
            .execute()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        // postgrest bundles its own reqwest without the json feature, so
        // response bodies are parsed by hand.
        let body = response
            .text()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        let clients: Vec<Client> =
            serde_json::from_str(&body).map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(clients)
    }

    async fn insert_client(&self, client: NewClient) -> Result<Uuid, DatabaseError> {
        let response = self
            .client
            .from("clients")
            .insert(
                serde_json::to_string(&client)
                    .map_err(|e| DatabaseError::QueryError(e.to_string()))?,
            )
            .select("id")
            .execute()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        let result: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        let client_id = result
            .first()
            .and_then(|row| row["id"].as_str())
            .ok_or(DatabaseError::QueryError(
                "No client ID returned".to_string(),
            ))?;

        Uuid::parse_str(client_id).map_err(|e| DatabaseError::QueryError(e.to_string()))
    }
}
