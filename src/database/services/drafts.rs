use super::super::errors::DatabaseError;
use super::super::types::{EstimateDraft, NewEstimateDraft};
use super::super::DatabaseService;
use async_trait::async_trait;
use chrono::Utc;
use tracing::error;
use uuid::Uuid;

/// Store operations the auto-save reconciler and the edit-mode loader need.
/// Split out as a trait so the reconciler can be exercised without a live
/// Supabase instance.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn find_draft(
        &self,
        owner_id: Uuid,
        client_name: &str,
    ) -> Result<Option<EstimateDraft>, DatabaseError>;

    async fn get_draft(&self, id: Uuid) -> Result<Option<EstimateDraft>, DatabaseError>;

    async fn list_drafts(&self, owner_id: Uuid) -> Result<Vec<EstimateDraft>, DatabaseError>;

    async fn insert_draft(&self, draft: NewEstimateDraft) -> Result<Uuid, DatabaseError>;

    async fn update_draft(
        &self,
        id: Uuid,
        document: &serde_json::Value,
    ) -> Result<(), DatabaseError>;
}

#[async_trait]
impl DraftStore for DatabaseService {
    async fn find_draft(
        &self,
        owner_id: Uuid,
        client_name: &str,
    ) -> Result<Option<EstimateDraft>, DatabaseError> {
        let response = self
            .client
            .from("estimate_drafts")
            .select("*")
            .eq("owner_id", owner_id.to_string())
            .eq("client_name", client_name)
            .order("updated_at.desc")
            .limit(1)
            .execute()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        if response.status() == 406 {
            // No rows found
            return Ok(None);
        }

        // postgrest bundles its own reqwest without the json feature, so
        // response bodies are parsed by hand.
        let body = response
            .text()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        let drafts: Vec<EstimateDraft> =
            serde_json::from_str(&body).map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(drafts.into_iter().next())
    }

    async fn get_draft(&self, id: Uuid) -> Result<Option<EstimateDraft>, DatabaseError> {
        let response = self
            .client
            .from("estimate_drafts")
            .select("*")
            .eq("id", id.to_string())
            .single()
            .execute()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        if response.status() == 406 {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        let draft: EstimateDraft =
            serde_json::from_str(&body).map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(Some(draft))
    }

    async fn list_drafts(&self, owner_id: Uuid) -> Result<Vec<EstimateDraft>, DatabaseError> {
        let response = self
            .client
            .from("estimate_drafts")
            .select("*")
            .eq("owner_id", owner_id.to_string())
            .order("updated_at.desc")
            .execute()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        let drafts: Vec<EstimateDraft> =
            serde_json::from_str(&body).map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(drafts)
    }

    async fn insert_draft(&self, draft: NewEstimateDraft) -> Result<Uuid, DatabaseError> {
        let row = serde_json::json!({
            "owner_id": draft.owner_id,
            "client_name": draft.client_name,
            "document": draft.document,
            "created_at": Utc::now(),
            "updated_at": Utc::now(),
        });

        let response = self
            .client
            .from("estimate_drafts")
            .insert(row.to_string())
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

        let draft_id = result
            .first()
            .and_then(|row| row["id"].as_str())
            .ok_or(DatabaseError::QueryError(
                "No draft ID returned".to_string(),
            ))?;

        Uuid::parse_str(draft_id).map_err(|e| DatabaseError::QueryError(e.to_string()))
    }

    async fn update_draft(
        &self,
        id: Uuid,
        document: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let update_data = serde_json::json!({
            "document": document,
            "updated_at": Utc::now(),
        });

        let response = self
            .client
            .from("estimate_drafts")
            .update(update_data.to_string())
            .eq("id", id.to_string())
            .execute()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Error updating draft {}: {}", id, error_text);
            return Err(DatabaseError::QueryError(format!(
                "Update failed: {}",
                error_text
            )));
        }

        Ok(())
    }
}
