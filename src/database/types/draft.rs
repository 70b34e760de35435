use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted, not-yet-finalized estimate. The document column holds the
/// serialized estimate payload; its shape has drifted over time, so reads go
/// through the normalizer before editing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateDraft {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub client_name: Option<String>,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `client_name` is always a string, empty when no client has been picked
/// yet. A NULL column would never match the `eq` filter the reconciler uses
/// to find the row again, so clientless drafts would duplicate on every save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEstimateDraft {
    pub owner_id: Uuid,
    pub client_name: String,
    pub document: serde_json::Value,
}
