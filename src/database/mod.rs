use postgrest::Postgrest;
use std::env;

pub mod errors;
pub mod services;
pub mod types;

pub use errors::DatabaseError;
pub use services::drafts::DraftStore;
pub use services::clients::ClientStore;

pub struct DatabaseService {
    client: Postgrest,
}

impl DatabaseService {
    pub fn new() -> Result<Self, DatabaseError> {
        let url = env::var("SUPABASE_URL")
            .map_err(|_| DatabaseError::ConnectionError("SUPABASE_URL not found".to_string()))?;
        let service_key = env::var("SUPABASE_KEY")
            .map_err(|_| DatabaseError::ConnectionError("SUPABASE_KEY not found".to_string()))?;

        Ok(Self::with_rest_url(&format!("{}/rest/v1", url), &service_key))
    }

    pub fn with_rest_url(rest_url: &str, service_key: &str) -> Self {
        let client = Postgrest::new(rest_url)
            .insert_header("apikey", service_key)
            .insert_header("Authorization", &format!("Bearer {}", service_key));

        Self { client }
    }
}
