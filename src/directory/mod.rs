use crate::database::errors::DatabaseError;
use crate::database::services::clients::ClientStore;
use crate::database::types::{Client, NewClient};
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Client directory with a short-lived per-owner cache in front of the
/// store. The normalizer and the wizard's client step both hit this on every
/// load, so the list is not refetched within the TTL.
pub struct ClientDirectory {
    store: Arc<dyn ClientStore>,
    cache: Cache<Uuid, Arc<Vec<Client>>>,
}

impl ClientDirectory {
    pub fn new(store: Arc<dyn ClientStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: Cache::builder().max_capacity(256).time_to_live(ttl).build(),
        }
    }

    pub async fn clients_for(&self, owner_id: Uuid) -> Result<Arc<Vec<Client>>, DatabaseError> {
        if let Some(clients) = self.cache.get(&owner_id) {
            return Ok(clients);
        }
        let clients = Arc::new(self.store.list_clients(owner_id).await?);
        self.cache.insert(owner_id, clients.clone());
        Ok(clients)
    }

    pub async fn resolve_by_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<Client>, DatabaseError> {
        let wanted = name.trim();
        let clients = self.clients_for(owner_id).await?;
        Ok(clients
            .iter()
            .find(|client| client.name.trim().eq_ignore_ascii_case(wanted))
            .cloned())
    }

    pub async fn add_client(&self, client: NewClient) -> Result<Uuid, DatabaseError> {
        let owner_id = client.owner_id;
        let id = self.store.insert_client(client).await?;
        self.cache.invalidate(&owner_id);
        Ok(id)
    }
}
