//! Catalog content client.

use async_trait::async_trait;
use autopilot_core::collaborators::{CollaboratorError, ContentSource};
use autopilot_core::content::EntityContent;

use crate::client;

const SERVICE: &str = "catalog";

pub struct HttpCatalog {
    client: reqwest::Client,
    api_url: String,
}

impl HttpCatalog {
    pub fn new(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }
}

#[async_trait]
impl ContentSource for HttpCatalog {
    /// `GET /tenants/{tenant_id}/entities/{entity_id}`; `404` means the
    /// entity no longer exists.
    async fn fetch(
        &self,
        tenant_id: &str,
        entity_id: &str,
    ) -> Result<Option<EntityContent>, CollaboratorError> {
        let url = client::endpoint(&self.api_url, &["tenants", tenant_id, "entities", entity_id])
            .map_err(|e| e.into_collaborator(SERVICE))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| client::ApiError::from(e).into_collaborator(SERVICE))?;
        client::parse_optional(response)
            .await
            .map_err(|e| e.into_collaborator(SERVICE))
    }
}
