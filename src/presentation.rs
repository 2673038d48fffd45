//! Render-ready snapshots of session state
//!
//! Nothing here draws anything. A front end turns [`SessionView`] into
//! widgets; the rules about what each image shows live in [`view_of`].

use crate::types::{ImageEntry, ImageStatus, MediaId, Notification};
use bytes::Bytes;
use serde::Serialize;

/// What to show in place of one image
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageView {
    /// Bytes not available yet
    Spinner,
    /// Display the fetched bytes
    Image {
        /// Image bytes
        bytes: Bytes,
        /// Content type reported by the proxy
        content_type: String,
    },
    /// The image could not be displayed; the user can still act on it
    Unavailable {
        /// Affordances offered instead of the image
        actions: Vec<ManualAction>,
    },
}

/// Manual actions offered for an image that failed to load
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualAction {
    /// Try the download anyway (ends in the proxy-URL fallback if the fetch fails again)
    Download,
    /// Copy the source URL to the clipboard
    CopyUrl,
}

/// Map an entry to its view
///
/// A Failed entry never renders as an image, even if bytes were attached
/// before the failure.
pub fn view_of(entry: &ImageEntry) -> ImageView {
    match (entry.status(), entry.local_bytes()) {
        (ImageStatus::Loaded, Some(image)) => ImageView::Image {
            bytes: image.bytes.clone(),
            content_type: image.content_type.clone(),
        },
        (ImageStatus::Failed, _) => ImageView::Unavailable {
            actions: vec![ManualAction::Download, ManualAction::CopyUrl],
        },
        _ => ImageView::Spinner,
    }
}

/// Short status label for an entry
pub fn status_label(status: ImageStatus) -> &'static str {
    match status {
        ImageStatus::Pending => "Loading",
        ImageStatus::Loaded => "Loaded",
        ImageStatus::Failed => "Error",
    }
}

/// One image card
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageCard {
    /// Image id, shown as "Image N"
    pub id: MediaId,
    /// Source URL, for copy-to-clipboard
    pub source_url: String,
    /// Status at snapshot time
    pub status: ImageStatus,
    /// What to render
    pub view: ImageView,
}

impl ImageCard {
    /// Card title
    pub fn title(&self) -> String {
        format!("Image {}", self.id)
    }

    /// Whether the per-image download button is usable
    ///
    /// Downloading stays available for Failed images; it ends in the fallback.
    pub fn can_download(&self, bulk_running: bool) -> bool {
        !bulk_running
    }
}

impl From<&ImageEntry> for ImageCard {
    fn from(entry: &ImageEntry) -> Self {
        Self {
            id: entry.id(),
            source_url: entry.reference.source_url.clone(),
            status: entry.status(),
            view: view_of(entry),
        }
    }
}

/// Snapshot of everything a front end needs to draw
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionView {
    /// A resolution is in flight
    pub loading: bool,
    /// A bulk download is in flight
    pub bulk_running: bool,
    /// Reason from the last failed resolution, shown inline
    pub inline_error: Option<String>,
    /// Cards in id order
    pub images: Vec<ImageCard>,
    /// Visible notification, if any
    pub notification: Option<Notification>,
}

impl SessionView {
    /// Build a view from entries and flags
    pub fn new(
        entries: &[ImageEntry],
        loading: bool,
        bulk_running: bool,
        inline_error: Option<String>,
        notification: Option<Notification>,
    ) -> Self {
        Self {
            loading,
            bulk_running,
            inline_error,
            images: entries.iter().map(ImageCard::from).collect(),
            notification,
        }
    }

    /// "Found N image(s)" header, or `None` with nothing to show
    pub fn heading(&self) -> Option<String> {
        match self.images.len() {
            0 => None,
            1 => Some("Found 1 image".to_string()),
            n => Some(format!("Found {} images", n)),
        }
    }

    /// Whether "Download All" is usable
    pub fn can_download_all(&self) -> bool {
        !self.bulk_running && !self.images.is_empty()
    }

    /// Whether the submit button is usable
    pub fn can_submit(&self) -> bool {
        !self.loading
    }
}
