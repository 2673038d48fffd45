//! # insta-media-dl
//!
//! Headless client for saving the images of an Instagram post through a
//! companion backend.
//!
//! The backend exposes two endpoints: `POST /download` resolves a post URL
//! into its media URLs, and `GET /proxy-image?url=...` streams one image
//! past the CDN's hotlink protection. This crate drives both and keeps the
//! state a front end needs to render the result.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No UI; a front end renders [`SessionView`]
//! - **Injected side effects** - Saving files, opening URLs and the clipboard
//!   go through [`FileSaver`] and [`LinkOpener`]
//! - **Event-driven** - Consumers subscribe to [`Event`]s, no polling required
//! - **Sensible defaults** - Works against a local backend with zero configuration
//!
//! ## Quick Start
//!
//! ```no_run
//! use insta_media_dl::{Config, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(Config::with_base_url("http://127.0.0.1:8000"))?;
//!
//!     // Subscribe to events
//!     let mut events = session.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let count = session.submit("https://www.instagram.com/p/ABC123/").await?;
//!     println!("found {} images", count);
//!
//!     let summary = session.download_all().await?;
//!     println!("{} of {} saved", summary.saved(), summary.total());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Save, open and clipboard capabilities
pub mod capabilities;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Image retrieval through the proxy
pub mod fetcher;
/// Transient user notifications
pub mod notifications;
/// Single and bulk download orchestration
pub mod orchestrator;
/// Render-ready view state
pub mod presentation;
/// Post URL resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Lookup session tying everything together
pub mod session;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use capabilities::{
    DirectorySaver, FileSaver, LinkOpener, NoOpOpener, SavePayload, SavedFile, SystemOpener,
};
pub use config::{BackendConfig, Config, DownloadConfig, FileCollisionAction, NotificationConfig};
pub use error::{Error, FetchError, ResolutionError, Result, SaveError};
pub use fetcher::{ImageFetcher, ImageSource};
pub use notifications::NotificationCenter;
pub use orchestrator::DownloadOrchestrator;
pub use presentation::{ImageCard, ImageView, ManualAction, SessionView};
pub use resolver::MediaResolver;
pub use session::{Session, SessionBuilder};
pub use types::{
    BulkSummary, DownloadOutcome, Event, FetchedImage, ImageEntry, ImageStatus, MediaId,
    MediaReference, Notification, NotificationKind,
};
