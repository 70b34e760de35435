use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    Individual,
    Business,
    PropertyManager,
}

impl Default for ClientKind {
    fn default() -> Self {
        ClientKind::Individual
    }
}

/// A client record. Persisted independently of any estimate and referenced
/// by id; the normalizer may also build a synthetic, unpersisted one from
/// contact fields embedded in a legacy draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile_phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub classification: ClientKind,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Client {
    pub fn named(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: None,
            phone: None,
            mobile_phone: None,
            address: None,
            city: None,
            postal_code: None,
            tags: Vec::new(),
            classification: ClientKind::default(),
            notes: None,
        }
    }
}

/// Insert payload for the clients table; the id is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClient {
    pub owner_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile_phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub classification: ClientKind,
    #[serde(default)]
    pub notes: Option<String>,
}
