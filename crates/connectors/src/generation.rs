//! Content-generation backend client.

use async_trait::async_trait;
use autopilot_core::collaborators::Generator;
use autopilot_core::content::ContentContext;
use autopilot_core::generation::{GenerationError, GenerationResponse};
use reqwest::StatusCode;
use serde_json::json;

use crate::client::{self, ApiError};

pub struct HttpGenerator {
    client: reqwest::Client,
    api_url: String,
}

impl HttpGenerator {
    pub fn new(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }
}

/// Classify an HTTP failure for the retry policy: throttling, timeouts and
/// server errors are transient; any other client error is a rejection.
pub fn classify(error: ApiError) -> GenerationError {
    if let ApiError::InvalidUrl(_) = &error {
        return GenerationError::Rejected(error.to_string());
    }
    if let ApiError::Request(e) = &error {
        if e.is_timeout() {
            return GenerationError::Timeout(0);
        }
        if e.is_decode() {
            return GenerationError::Rejected(error.to_string());
        }
    }
    match error.status() {
        Some(StatusCode::TOO_MANY_REQUESTS) => GenerationError::RateLimited(error.to_string()),
        Some(StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT) => {
            GenerationError::Timeout(0)
        }
        Some(status) if status.is_client_error() => GenerationError::Rejected(error.to_string()),
        _ => GenerationError::Unavailable(error.to_string()),
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    /// `POST /generate` with `{ entity_id, context }`.
    async fn generate(
        &self,
        entity_id: &str,
        context: &ContentContext,
    ) -> Result<GenerationResponse, GenerationError> {
        let url = client::endpoint(&self.api_url, &["generate"]).map_err(classify)?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "entity_id": entity_id, "context": context }))
            .send()
            .await
            .map_err(|e| classify(e.into()))?;
        client::parse_response(response).await.map_err(classify)
    }
}
