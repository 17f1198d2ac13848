use std::time::Duration;

use autopilot_core::error::CoreError;

/// Base URLs and timeouts for the external collaborators.
#[derive(Debug, Clone)]
pub struct ConnectorsConfig {
    pub entitlement_api_url: String,
    pub catalog_api_url: String,
    pub generation_api_url: String,
    pub content_api_url: String,
    /// Request timeout for every service except generation, whose attempts
    /// are bounded by the engine.
    pub request_timeout: Duration,
}

impl ConnectorsConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                      | Default    |
    /// |------------------------------|------------|
    /// | `ENTITLEMENT_API_URL`        | (required) |
    /// | `CATALOG_API_URL`            | (required) |
    /// | `GENERATION_API_URL`         | (required) |
    /// | `CONTENT_API_URL`            | (required) |
    /// | `COLLABORATOR_TIMEOUT_SECS`  | `10`       |
    pub fn from_env() -> Result<Self, CoreError> {
        let request_timeout_secs: u64 = match std::env::var("COLLABORATOR_TIMEOUT_SECS") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                CoreError::Validation(format!("COLLABORATOR_TIMEOUT_SECS has an invalid value '{raw}'"))
            })?,
            Err(_) => 10,
        };

        Ok(Self {
            entitlement_api_url: required("ENTITLEMENT_API_URL")?,
            catalog_api_url: required("CATALOG_API_URL")?,
            generation_api_url: required("GENERATION_API_URL")?,
            content_api_url: required("CONTENT_API_URL")?,
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }

    /// Shared client with the collaborator request timeout.
    pub fn http_client(&self) -> Result<reqwest::Client, CoreError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("failed to build HTTP client: {e}")))
    }

    /// Client for the generation backend. No request timeout: each attempt
    /// is bounded by the engine's retry policy instead.
    pub fn generation_client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }
}

fn required(name: &str) -> Result<String, CoreError> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::Validation(format!("{name} must be set")))
}
