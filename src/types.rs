//! Core types and events for insta-media-dl

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 1-based position of a media item within one resolution result
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub u32);

impl MediaId {
    /// Create a new MediaId
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for MediaId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl PartialEq<u32> for MediaId {
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One media URL returned by the resolver
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    /// Position in the resolved list, starting at 1
    pub id: MediaId,
    /// Direct media URL as returned by the backend
    pub source_url: String,
}

impl MediaReference {
    /// Number a list of source URLs `1..=N` in order
    pub fn from_urls(urls: Vec<String>) -> Vec<MediaReference> {
        urls.into_iter()
            .zip(1u32..)
            .map(|(source_url, id)| MediaReference {
                id: MediaId(id),
                source_url,
            })
            .collect()
    }
}

/// Image bytes retrieved through the proxy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedImage {
    /// Full response body
    pub bytes: Bytes,
    /// Content type reported by the proxy
    pub content_type: String,
}

impl FetchedImage {
    /// Size of the image in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the proxy returned an empty body
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Load state of a single image
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    /// Fetch not finished yet
    Pending,
    /// Bytes available for display
    Loaded,
    /// Image could not be retrieved
    Failed,
}

/// Per-image state held by the session
#[derive(Clone, Debug)]
pub struct ImageEntry {
    /// The media this entry displays
    pub reference: MediaReference,
    status: ImageStatus,
    local_bytes: Option<FetchedImage>,
}

impl ImageEntry {
    /// New entry in the Pending state
    pub fn new(reference: MediaReference) -> Self {
        Self {
            reference,
            status: ImageStatus::Pending,
            local_bytes: None,
        }
    }

    /// Entry id (same as the reference id)
    pub fn id(&self) -> MediaId {
        self.reference.id
    }

    /// Current status
    pub fn status(&self) -> ImageStatus {
        self.status
    }

    /// Fetched bytes, present only when Loaded
    pub fn local_bytes(&self) -> Option<&FetchedImage> {
        self.local_bytes.as_ref()
    }

    /// Pending → Loaded. Returns false (and changes nothing) from any other state.
    pub fn mark_loaded(&mut self, image: FetchedImage) -> bool {
        if self.status != ImageStatus::Pending {
            return false;
        }
        self.status = ImageStatus::Loaded;
        self.local_bytes = Some(image);
        true
    }

    /// Pending → Failed. Returns false (and changes nothing) from any other state.
    pub fn mark_failed(&mut self) -> bool {
        if self.status != ImageStatus::Pending {
            return false;
        }
        self.status = ImageStatus::Failed;
        true
    }
}

/// Visual kind of a notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Green toast
    Success,
    /// Red toast
    Error,
}

/// Transient user-facing message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Text shown to the user
    pub message: String,
    /// Success or error styling
    pub kind: NotificationKind,
    /// When the notification was raised
    pub created_at: DateTime<Utc>,
}

/// Terminal outcome of downloading one image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// Bytes were handed to the saver
    Saved {
        /// Image id
        id: MediaId,
        /// Where the saver put the file
        location: String,
        /// Bytes written
        bytes_written: u64,
    },
    /// Fetch or save failed; the proxy URL was opened for manual saving
    OpenedFallback {
        /// Image id
        id: MediaId,
        /// The URL that was opened
        url: String,
    },
    /// Both the download and the fallback failed
    Failed {
        /// Image id
        id: MediaId,
        /// Last error message
        error: String,
    },
}

impl DownloadOutcome {
    /// Image id this outcome belongs to
    pub fn id(&self) -> MediaId {
        match self {
            DownloadOutcome::Saved { id, .. }
            | DownloadOutcome::OpenedFallback { id, .. }
            | DownloadOutcome::Failed { id, .. } => *id,
        }
    }

    /// Whether the file was saved without falling back
    pub fn is_saved(&self) -> bool {
        matches!(self, DownloadOutcome::Saved { .. })
    }

    /// Whether the item ended in a hard failure
    pub fn is_failed(&self) -> bool {
        matches!(self, DownloadOutcome::Failed { .. })
    }
}

/// Aggregate result of a bulk download
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    /// Per-item outcomes in list order
    pub outcomes: Vec<DownloadOutcome>,
}

impl BulkSummary {
    /// Number of items attempted
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Items saved directly
    pub fn saved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_saved()).count()
    }

    /// Items that ended in the manual-save fallback
    pub fn opened_fallback(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DownloadOutcome::OpenedFallback { .. }))
            .count()
    }

    /// Items that failed outright
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    /// True when every item was saved directly
    pub fn all_saved(&self) -> bool {
        self.outcomes.iter().all(DownloadOutcome::is_saved)
    }
}

/// Event emitted while resolving and downloading
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A resolve request was sent
    ResolveStarted {
        /// The submitted post URL
        post_url: String,
    },

    /// The backend returned media URLs and entries were installed
    Resolved {
        /// Number of entries
        count: usize,
    },

    /// Resolution failed; the list stays empty
    ResolutionFailed {
        /// Reason shown to the user
        error: String,
    },

    /// An entry moved to Loaded
    ImageLoaded {
        /// Image id
        id: MediaId,
        /// Size in bytes
        size: usize,
        /// Content type from the proxy
        content_type: String,
    },

    /// An entry moved to Failed
    ImageFailed {
        /// Image id
        id: MediaId,
        /// Error message
        error: String,
    },

    /// A single-image download started
    DownloadStarted {
        /// Image id
        id: MediaId,
    },

    /// A single-image download reached its terminal outcome
    DownloadFinished {
        /// The outcome
        outcome: DownloadOutcome,
    },

    /// A bulk download started
    BulkStarted {
        /// Number of items to process
        total: usize,
    },

    /// A bulk download finished
    BulkFinished {
        /// Items attempted
        total: usize,
        /// Items saved directly
        saved: usize,
        /// Items that needed the manual fallback
        opened_fallback: usize,
        /// Items that failed
        failed: usize,
    },

    /// A notification replaced the active one
    Notified {
        /// The new notification
        notification: Notification,
    },
}
