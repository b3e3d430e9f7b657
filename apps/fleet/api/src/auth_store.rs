//! Bearer-token lookup against the clients table.

use async_trait::async_trait;
use axum_helpers::AuthStore;
use domain_agents::{AgentRepository, PgAgentRepository};
use std::sync::Arc;
use uuid::Uuid;

/// Resolves client tokens through the agents repository.
pub struct DbAuthStore {
    repository: Arc<PgAgentRepository>,
}

impl DbAuthStore {
    pub fn new(repository: Arc<PgAgentRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl AuthStore for DbAuthStore {
    async fn client_id_for_token_hash(&self, token_hash: &str) -> Result<Option<Uuid>, String> {
        self.repository
            .client_by_token_hash(token_hash)
            .await
            .map(|client| client.map(|c| c.id))
            .map_err(|e| e.to_string())
    }
}
