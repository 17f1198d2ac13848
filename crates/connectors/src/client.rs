//! Shared request plumbing.

use autopilot_core::collaborators::CollaboratorError;
use reqwest::StatusCode;

/// Errors from the HTTP layer, before they are mapped onto a collaborator
/// error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The request URL could not be built from the base URL and ids.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => StatusCode::from_u16(*status).ok(),
            ApiError::Request(e) => e.status(),
            ApiError::InvalidUrl(_) => None,
        }
    }

    /// Map onto the collaborator taxonomy: client errors are rejections,
    /// undecodable bodies are invalid responses, everything else means the
    /// service is unavailable.
    pub fn into_collaborator(self, service: &'static str) -> CollaboratorError {
        let message = self.to_string();
        match &self {
            ApiError::Request(e) if e.is_decode() => {
                CollaboratorError::InvalidResponse { service, message }
            }
            ApiError::Status { status, .. } if (400..500).contains(status) && *status != 429 => {
                CollaboratorError::Rejected { service, message }
            }
            ApiError::InvalidUrl(_) => CollaboratorError::Rejected { service, message },
            _ => CollaboratorError::Unavailable { service, message },
        }
    }
}

/// Ensure the response has a success status code, returning it unchanged.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let url = response.url().clone();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        tracing::debug!(status = status.as_u16(), url = %url, "Collaborator returned an error status");
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body.
pub async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

/// Like [`parse_response`] but maps `404 Not Found` to `None`.
pub async fn parse_optional<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>, ApiError> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    parse_response(response).await.map(Some)
}

/// Append `segments` to the path of `base`, percent-encoding each one.
///
/// Ids are opaque: a `/`, `?` or `#` inside one must not address a
/// different resource. `.` and `..` are refused because the URL parser
/// would drop them from the path.
pub fn endpoint(base: &str, segments: &[&str]) -> Result<reqwest::Url, ApiError> {
    if let Some(segment) = segments.iter().find(|s| matches!(**s, "." | "..")) {
        return Err(ApiError::InvalidUrl(format!(
            "path segment '{segment}' cannot be addressed"
        )));
    }

    let mut url =
        reqwest::Url::parse(base).map_err(|e| ApiError::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| ApiError::InvalidUrl(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
