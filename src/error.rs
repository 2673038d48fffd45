//! Error types for insta-media-dl
//!
//! Errors are split by the step that produced them:
//! - [`ResolutionError`] - turning a post URL into media URLs (aborts the whole resolution)
//! - [`FetchError`] - retrieving one image's bytes through the proxy (isolated to that image)
//! - [`SaveError`] - dispatching a file save or a manual-save fallback (isolated to that image)
//!
//! The crate-level [`Error`] wraps all three plus session-level failures.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::MediaId;

/// Result type alias for insta-media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for insta-media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "backend.base_url")
        key: Option<String>,
    },

    /// User input rejected before any network call
    #[error("validation error: {0}")]
    Validation(String),

    /// Post URL could not be resolved into media
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// Image bytes could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// File save or fallback dispatch failed
    #[error("save failed: {0}")]
    Save(#[from] SaveError),

    /// A newer submission replaced this one before it finished; its result was discarded
    #[error("superseded by a newer submission")]
    Superseded,

    /// The operation was abandoned because a newer submission replaced its list
    #[error("cancelled: the image list was replaced")]
    Cancelled,

    /// A bulk download is already running
    #[error("a bulk download is already in progress")]
    BulkInProgress,

    /// No image with this id in the current list
    #[error("image {0} not found")]
    NotFound(MediaId),

    /// Failed to build the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::Resolution(e) => match e {
                ResolutionError::Rejected { .. } => "resolution_rejected",
                ResolutionError::Timeout { .. } => "resolution_timeout",
                _ => "resolution_failed",
            },
            Error::Fetch(e) => match e {
                FetchError::Timeout { .. } => "fetch_timeout",
                FetchError::HttpStatus { .. } => "fetch_http_status",
                FetchError::UnexpectedContent { .. } => "fetch_not_media",
                _ => "fetch_failed",
            },
            Error::Save(e) => match e {
                SaveError::Collision { .. } => "file_collision",
                SaveError::OpenFailed { .. } => "open_failed",
                SaveError::ClipboardFailed(_) => "clipboard_failed",
                SaveError::NotSupported(_) => "not_supported",
                _ => "save_failed",
            },
            Error::Superseded => "superseded",
            Error::Cancelled => "cancelled",
            Error::BulkInProgress => "bulk_in_progress",
            Error::NotFound(_) => "not_found",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }
}

/// Errors from the resolve endpoint
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Request could not be sent or the connection failed
    #[error("could not reach backend: {0}")]
    Transport(String),

    /// No response within the configured request timeout
    #[error("backend did not respond within {seconds} seconds")]
    Timeout {
        /// The timeout that elapsed
        seconds: u64,
    },

    /// Backend answered with a non-success HTTP status
    #[error("HTTP error! status: {status}")]
    HttpStatus {
        /// The HTTP status code returned
        status: u16,
    },

    /// Response body was not the expected JSON shape
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    /// Backend reported `success: false`; `reason` is shown to the user verbatim
    #[error("{reason}")]
    Rejected {
        /// The backend-provided reason
        reason: String,
    },
}

impl ResolutionError {
    /// Human-readable reason, suitable for the inline error message
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Errors from the image proxy endpoint
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request could not be sent or the connection failed
    #[error("could not reach image proxy: {message}")]
    Transport {
        /// Transport error description
        message: String,
        /// Whether the failure happened while connecting
        connect: bool,
    },

    /// No response within the configured request timeout
    #[error("image proxy did not respond within {seconds} seconds")]
    Timeout {
        /// The timeout that elapsed
        seconds: u64,
    },

    /// Proxy answered with a non-success HTTP status
    #[error("HTTP error! status: {status}")]
    HttpStatus {
        /// The HTTP status code returned
        status: u16,
    },

    /// Response body could not be read
    #[error("failed to read image body: {0}")]
    Body(String),

    /// Proxy answered 200 with something that is not an image or video
    /// (the backend reports upstream failures as a JSON body)
    #[error("image proxy returned {content_type} instead of media")]
    UnexpectedContent {
        /// The content type the proxy sent
        content_type: String,
    },
}

/// Errors from the injected save, open and clipboard capabilities
#[derive(Debug, Error)]
pub enum SaveError {
    /// Writing the file failed
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Destination exists and collision action is Skip
    #[error("file collision at {path}: {reason}")]
    Collision {
        /// The path where the collision occurred
        path: PathBuf,
        /// Why the collision could not be resolved
        reason: String,
    },

    /// Destination path could not be used
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The invalid path
        path: PathBuf,
        /// The reason the path is invalid
        reason: String,
    },

    /// Opening the URL in an external context failed
    #[error("failed to open {url}: {reason}")]
    OpenFailed {
        /// The URL that could not be opened
        url: String,
        /// The reason opening failed
        reason: String,
    },

    /// Writing to the clipboard failed
    #[error("failed to copy to clipboard: {0}")]
    ClipboardFailed(String),

    /// The capability is not available in this environment
    #[error("not supported: {0}")]
    NotSupported(String),
}
