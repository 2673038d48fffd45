//! In-memory capabilities for driving the orchestrator and session without a backend.
//!
//! Test URLs follow the `https://cdn/<id>.jpg` shape used by
//! [`MediaReference::from_urls`](crate::types::MediaReference::from_urls) fixtures.

use crate::capabilities::{FileSaver, LinkOpener, SavePayload, SavedFile};
use crate::error::{FetchError, SaveError};
use crate::fetcher::ImageSource;
use crate::types::FetchedImage;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// One recorded fetch
#[derive(Clone, Debug)]
pub(crate) struct FetchCall {
    pub(crate) url: String,
    pub(crate) started: Instant,
    pub(crate) finished: Instant,
}

/// Image source with scripted responses that records every call
pub(crate) struct ScriptedSource {
    body: Bytes,
    content_type: String,
    failing: HashSet<String>,
    transient_failures: AtomicU32,
    delay: Duration,
    calls: Mutex<Vec<FetchCall>>,
}

impl ScriptedSource {
    /// Every fetch succeeds with the same body
    pub(crate) fn ok_with(body: Vec<u8>, content_type: &str) -> Self {
        Self {
            body: Bytes::from(body),
            content_type: content_type.to_string(),
            failing: HashSet::new(),
            transient_failures: AtomicU32::new(0),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fetches of `https://cdn/<id>.jpg` for the given ids fail with 404
    pub(crate) fn failing_ids(ids: &[u32]) -> Self {
        let mut source = Self::ok_with(vec![0xff, 0xd8, 0xff], "image/jpeg");
        source.failing = ids.iter().map(|id| format!("https://cdn/{id}.jpg")).collect();
        source
    }

    /// The first `n` fetches fail with 503, later ones succeed
    pub(crate) fn transient_then_ok(n: u32, body: Vec<u8>) -> Self {
        let source = Self::ok_with(body, "image/jpeg");
        source.transient_failures.store(n, Ordering::SeqCst);
        source
    }

    /// Each fetch takes `delay` of tokio time
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Recorded calls in start order
    pub(crate) fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageSource for ScriptedSource {
    async fn fetch(&self, source_url: &str) -> Result<FetchedImage, FetchError> {
        let started = Instant::now();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().unwrap().push(FetchCall {
            url: source_url.to_string(),
            started,
            finished: Instant::now(),
        });

        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FetchError::HttpStatus { status: 503 });
        }
        if self.failing.contains(source_url) {
            return Err(FetchError::HttpStatus { status: 404 });
        }

        Ok(FetchedImage {
            bytes: self.body.clone(),
            content_type: self.content_type.clone(),
        })
    }

    fn manual_url(&self, source_url: &str) -> String {
        crate::utils::proxy_url("http://proxy.test", source_url)
    }
}

/// Saver that keeps payloads in memory
#[derive(Default)]
pub(crate) struct RecordingSaver {
    saved: Mutex<Vec<SavePayload>>,
    fail_next: AtomicBool,
}

impl RecordingSaver {
    /// Make the next save fail with an I/O error
    pub(crate) fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Payloads saved so far
    pub(crate) fn saved(&self) -> Vec<SavePayload> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileSaver for RecordingSaver {
    async fn save(&self, payload: SavePayload) -> Result<SavedFile, SaveError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SaveError::Io {
                path: payload.file_name.clone().into(),
                source: std::io::Error::other("disk full"),
            });
        }
        let saved = SavedFile {
            location: format!("memory://{}", payload.file_name),
            bytes_written: payload.bytes.len() as u64,
        };
        self.saved.lock().unwrap().push(payload);
        Ok(saved)
    }
}

/// Opener that records URLs and clipboard writes
pub(crate) struct RecordingOpener {
    works: bool,
    opened: Mutex<Vec<String>>,
    copied: Mutex<Vec<String>>,
}

impl RecordingOpener {
    /// Every open and copy succeeds
    pub(crate) fn working() -> Self {
        Self {
            works: true,
            opened: Mutex::new(Vec::new()),
            copied: Mutex::new(Vec::new()),
        }
    }

    /// Every open and copy fails
    pub(crate) fn broken() -> Self {
        Self {
            works: false,
            ..Self::working()
        }
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub(crate) fn copied(&self) -> Vec<String> {
        self.copied.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkOpener for RecordingOpener {
    async fn open(&self, url: &str) -> Result<(), SaveError> {
        if !self.works {
            return Err(SaveError::OpenFailed {
                url: url.to_string(),
                reason: "popup blocked".to_string(),
            });
        }
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), SaveError> {
        if !self.works {
            return Err(SaveError::ClipboardFailed("permission denied".to_string()));
        }
        self.copied.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
