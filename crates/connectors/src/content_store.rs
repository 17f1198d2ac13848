//! Generated-content persistence client.

use async_trait::async_trait;
use autopilot_core::collaborators::{CollaboratorError, ContentStore};
use autopilot_core::generation::GeneratedItem;
use serde_json::{json, Value};

use crate::client::{self, ApiError};

const SERVICE: &str = "content store";

pub struct HttpContentStore {
    client: reqwest::Client,
    api_url: String,
}

impl HttpContentStore {
    pub fn new(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    fn url(
        &self,
        tenant_id: &str,
        entity_id: &str,
        surface: &str,
    ) -> Result<reqwest::Url, CollaboratorError> {
        client::endpoint(
            &self.api_url,
            &["tenants", tenant_id, "entities", entity_id, "content", surface],
        )
        .map_err(|e| e.into_collaborator(SERVICE))
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn snapshot(
        &self,
        tenant_id: &str,
        entity_id: &str,
        surface: &str,
    ) -> Result<Option<Value>, CollaboratorError> {
        let response = self
            .client
            .get(self.url(tenant_id, entity_id, surface)?)
            .send()
            .await
            .map_err(|e| ApiError::from(e).into_collaborator(SERVICE))?;
        client::parse_optional(response)
            .await
            .map_err(|e| e.into_collaborator(SERVICE))
    }

    /// `PUT` replaces the surface's content in one request, so the service
    /// either stores every item or none.
    async fn write_generated_content(
        &self,
        tenant_id: &str,
        entity_id: &str,
        surface: &str,
        items: &[GeneratedItem],
    ) -> Result<(), CollaboratorError> {
        let response = self
            .client
            .put(self.url(tenant_id, entity_id, surface)?)
            .json(&json!({ "items": items }))
            .send()
            .await
            .map_err(|e| ApiError::from(e).into_collaborator(SERVICE))?;
        client::ensure_success(response)
            .await
            .map(|_| ())
            .map_err(|e| e.into_collaborator(SERVICE))
    }
}
