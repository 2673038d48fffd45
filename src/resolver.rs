//! Media resolution through the backend's `POST /download` endpoint.

use crate::config::BackendConfig;
use crate::error::{ResolutionError, Result};
use crate::types::MediaReference;
use crate::utils::{build_http_client, endpoint_url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fallback reason when the backend reports failure without a message
const DEFAULT_REJECTION: &str = "Failed to fetch images";

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    success: bool,
    #[serde(default)]
    media: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the resolve endpoint
///
/// Each call to [`resolve`](MediaResolver::resolve) makes exactly one request.
/// The post URL is passed through untouched; checking that it is a real
/// Instagram post is the backend's job.
#[derive(Clone, Debug)]
pub struct MediaResolver {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl MediaResolver {
    /// Create a resolver for the configured backend
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self::with_client(build_http_client(config)?, config))
    }

    /// Create a resolver that shares an existing HTTP client
    pub fn with_client(client: reqwest::Client, config: &BackendConfig) -> Self {
        Self {
            client,
            endpoint: endpoint_url(&config.base_url, "download"),
            timeout: config.request_timeout,
        }
    }

    /// Resolve a post URL into its media, numbered `1..=N` in backend order
    ///
    /// # Errors
    ///
    /// - [`ResolutionError::Timeout`] if the backend does not answer in time
    /// - [`ResolutionError::Transport`] if the request could not be sent
    /// - [`ResolutionError::HttpStatus`] for a non-success status
    /// - [`ResolutionError::InvalidResponse`] for a body that is not the expected JSON
    /// - [`ResolutionError::Rejected`] when the backend answers `success: false`
    pub async fn resolve(
        &self,
        post_url: &str,
    ) -> std::result::Result<Vec<MediaReference>, ResolutionError> {
        tracing::debug!(endpoint = %self.endpoint, post_url = %post_url, "resolving post");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ResolveRequest { url: post_url })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "resolve endpoint returned error status");
            return Err(ResolutionError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body: ResolveResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                ResolutionError::InvalidResponse(e.to_string())
            }
        })?;

        if !body.success {
            let reason = body
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_REJECTION.to_string());
            tracing::info!(reason = %reason, "backend rejected post");
            return Err(ResolutionError::Rejected { reason });
        }

        let references = MediaReference::from_urls(body.media.unwrap_or_default());
        tracing::info!(count = references.len(), "post resolved");
        Ok(references)
    }

    fn transport_error(&self, e: reqwest::Error) -> ResolutionError {
        if e.is_timeout() {
            ResolutionError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            ResolutionError::Transport(e.to_string())
        }
    }
}
