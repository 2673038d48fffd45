//! Image retrieval through the backend's `GET /proxy-image` endpoint.
//!
//! Instagram's CDN rejects hotlinked and cross-origin requests, so bytes are
//! always fetched through the proxy rather than from the source URL.

use crate::config::BackendConfig;
use crate::error::{FetchError, Result};
use crate::types::FetchedImage;
use crate::utils::{build_http_client, proxy_url};
use async_trait::async_trait;
use std::time::Duration;

/// Content type assumed when the proxy sends none
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Source of image bytes
///
/// [`ImageFetcher`] is the production implementation. The orchestrator and
/// session only see this trait, so they can be driven without a backend.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch the full image behind `source_url`
    ///
    /// Implementations must not retry internally. Dropping the returned
    /// future abandons the request.
    async fn fetch(&self, source_url: &str) -> std::result::Result<FetchedImage, FetchError>;

    /// URL a user can open to save `source_url` manually
    fn manual_url(&self, source_url: &str) -> String;
}

/// Fetches images through the backend proxy
#[derive(Clone, Debug)]
pub struct ImageFetcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ImageFetcher {
    /// Create a fetcher for the configured backend
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self::with_client(build_http_client(config)?, config))
    }

    /// Create a fetcher that shares an existing HTTP client
    pub fn with_client(client: reqwest::Client, config: &BackendConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            timeout: config.request_timeout,
        }
    }

    /// Proxy URL for `source_url`
    pub fn proxy_url(&self, source_url: &str) -> String {
        proxy_url(&self.base_url, source_url)
    }

    fn transport_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            FetchError::Transport {
                connect: e.is_connect(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ImageSource for ImageFetcher {
    async fn fetch(&self, source_url: &str) -> std::result::Result<FetchedImage, FetchError> {
        let url = self.proxy_url(source_url);
        tracing::debug!(url = %url, "fetching image through proxy");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "image/*")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                "image proxy returned error status"
            );
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        if !is_media_type(&content_type) {
            tracing::warn!(
                content_type = %content_type,
                url = %url,
                "image proxy returned a non-media body"
            );
            return Err(FetchError::UnexpectedContent { content_type });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                FetchError::Body(e.to_string())
            }
        })?;

        tracing::debug!(size = bytes.len(), content_type = %content_type, "image fetched");
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }

    fn manual_url(&self, source_url: &str) -> String {
        self.proxy_url(source_url)
    }
}

/// Whether a content type names an image or video, ignoring parameters and case
fn is_media_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("image/") || mime.starts_with("video/")
}
