//! Plan/entitlement service client.

use async_trait::async_trait;
use autopilot_core::collaborators::{CollaboratorError, Entitlement, Entitlements};
use serde::Deserialize;

use crate::client::{self, ApiError};

const SERVICE: &str = "entitlements";

/// `GET /tenants/{tenant_id}/entitlements/{rule_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementResponse {
    pub allowed: bool,
    #[serde(default, alias = "dailyCap")]
    pub daily_cap: Option<i64>,
}

impl From<EntitlementResponse> for Entitlement {
    fn from(response: EntitlementResponse) -> Self {
        Self {
            allowed: response.allowed,
            daily_cap: response.daily_cap,
        }
    }
}

pub struct HttpEntitlements {
    client: reqwest::Client,
    api_url: String,
}

impl HttpEntitlements {
    pub fn new(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Fetch the tenant's entitlement for one rule. Not cached: plans can
    /// change between Runs.
    pub async fn fetch(
        &self,
        tenant_id: &str,
        rule_id: &str,
    ) -> Result<EntitlementResponse, ApiError> {
        let url = client::endpoint(
            &self.api_url,
            &["tenants", tenant_id, "entitlements", rule_id],
        )?;
        let response = self.client.get(url).send().await?;
        client::parse_response(response).await
    }
}

#[async_trait]
impl Entitlements for HttpEntitlements {
    async fn entitlement(
        &self,
        tenant_id: &str,
        rule_id: &str,
    ) -> Result<Entitlement, CollaboratorError> {
        self.fetch(tenant_id, rule_id)
            .await
            .map(Entitlement::from)
            .map_err(|e| e.into_collaborator(SERVICE))
    }
}
