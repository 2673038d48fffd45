//! Download orchestration: fetch, save, fall back, and pace bulk runs.
//!
//! A single download goes through these steps:
//!
//! 1. Fetch the image through the [`ImageSource`] (retrying only if the
//!    [`RetryConfig`](crate::config::RetryConfig) allows it)
//! 2. Hand the bytes to the [`FileSaver`] as `<prefix>-<id>.jpg`
//! 3. If either step fails, open the proxy URL through the [`LinkOpener`]
//!    so the user can save the image by hand
//! 4. If that fails too, the item ends in a hard failure
//!
//! Every terminal outcome raises a notification. Bulk runs call the single
//! download for each item in order, one at a time, with a pacing delay in
//! between so the proxy and CDN do not see a burst of requests.

use crate::capabilities::{FileSaver, LinkOpener, SavePayload};
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::fetcher::ImageSource;
use crate::notifications::NotificationCenter;
use crate::retry::with_retry;
use crate::types::{BulkSummary, DownloadOutcome, Event, MediaReference};
use crate::utils::file_name_for;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Resets the bulk flag when a bulk run ends, including when its future is dropped
struct BulkGuard(Arc<AtomicBool>);

impl Drop for BulkGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives image fetches and file saves (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct DownloadOrchestrator {
    source: Arc<dyn ImageSource>,
    saver: Arc<dyn FileSaver>,
    opener: Arc<dyn LinkOpener>,
    notifications: Arc<NotificationCenter>,
    event_tx: broadcast::Sender<Event>,
    config: Arc<DownloadConfig>,
    bulk_running: Arc<AtomicBool>,
}

impl DownloadOrchestrator {
    /// Create an orchestrator from its capabilities
    pub fn new(
        source: Arc<dyn ImageSource>,
        saver: Arc<dyn FileSaver>,
        opener: Arc<dyn LinkOpener>,
        notifications: Arc<NotificationCenter>,
        event_tx: broadcast::Sender<Event>,
        config: DownloadConfig,
    ) -> Self {
        Self {
            source,
            saver,
            opener,
            notifications,
            event_tx,
            config: Arc::new(config),
            bulk_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a [`download_all`](Self::download_all) run is in progress
    pub fn is_bulk_running(&self) -> bool {
        self.bulk_running.load(Ordering::SeqCst)
    }

    /// Download one image, falling back to the manual-save path on failure
    ///
    /// Never returns an error: failures are reported through the outcome,
    /// a notification, and a [`Event::DownloadFinished`] event.
    pub async fn download_one(&self, reference: &MediaReference) -> DownloadOutcome {
        self.start(reference);
        let outcome = self.attempt(reference).await;
        self.finish(&outcome);
        outcome
    }

    /// Like [`download_one`](Self::download_one), abandoned once `cancel` fires
    ///
    /// Returns `None` if the token was cancelled before the outcome was
    /// reported. An abandoned download stops at its next await point, saves
    /// nothing further, and raises no notification or
    /// [`Event::DownloadFinished`].
    pub async fn download_one_until(
        &self,
        reference: &MediaReference,
        cancel: &CancellationToken,
    ) -> Option<DownloadOutcome> {
        if cancel.is_cancelled() {
            return None;
        }
        self.start(reference);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.attempt(reference) => Some(outcome),
        };
        match outcome {
            Some(outcome) if !cancel.is_cancelled() => {
                self.finish(&outcome);
                Some(outcome)
            }
            _ => {
                tracing::info!(id = %reference.id, "download abandoned, image list was replaced");
                None
            }
        }
    }

    /// Download every image in order, one at a time, with pacing in between
    ///
    /// See [`download_all_with`](Self::download_all_with).
    pub async fn download_all(&self, references: &[MediaReference]) -> Result<BulkSummary> {
        self.download_all_with(references, &CancellationToken::new(), |_| {})
            .await
    }

    /// Like [`download_all`](Self::download_all), calling `on_outcome` after each item
    ///
    /// Item *i+1* starts only after item *i* reached its terminal outcome and
    /// the pacing delay elapsed. A failing item never stops the run.
    ///
    /// Cancelling `cancel` stops the run at the current item or pacing sleep.
    /// Outcomes reported so far stand, but no summary notification is raised.
    ///
    /// # Errors
    ///
    /// - [`Error::BulkInProgress`] without doing any work if another bulk
    ///   run is still going
    /// - [`Error::Cancelled`] if `cancel` fired before the run finished
    pub async fn download_all_with<F>(
        &self,
        references: &[MediaReference],
        cancel: &CancellationToken,
        mut on_outcome: F,
    ) -> Result<BulkSummary>
    where
        F: FnMut(&DownloadOutcome) + Send,
    {
        if references.is_empty() {
            return Ok(BulkSummary::default());
        }

        if self
            .bulk_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("bulk download requested while one is running");
            return Err(Error::BulkInProgress);
        }
        let _guard = BulkGuard(self.bulk_running.clone());

        let total = references.len();
        self.emit(Event::BulkStarted { total });

        let mut summary = BulkSummary {
            outcomes: Vec::with_capacity(total),
        };
        for (index, reference) in references.iter().enumerate() {
            tracing::info!(item = index + 1, total, "bulk download item");
            let Some(outcome) = self.download_one_until(reference, cancel).await else {
                return Err(abandoned(summary.total(), total));
            };
            on_outcome(&outcome);
            summary.outcomes.push(outcome);

            if index + 1 < total {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(abandoned(summary.total(), total)),
                    _ = tokio::time::sleep(self.config.pacing_delay) => {}
                }
            }
        }
        if cancel.is_cancelled() {
            return Err(abandoned(summary.total(), total));
        }

        if summary.all_saved() {
            self.notifications
                .success(format!("All {} images downloaded successfully!", total));
        } else {
            self.notifications
                .error("Some images failed to download. Please try again.");
        }

        tracing::info!(
            total,
            saved = summary.saved(),
            opened_fallback = summary.opened_fallback(),
            failed = summary.failed(),
            "bulk download finished"
        );
        self.emit(Event::BulkFinished {
            total,
            saved: summary.saved(),
            opened_fallback: summary.opened_fallback(),
            failed: summary.failed(),
        });

        Ok(summary)
    }

    fn start(&self, reference: &MediaReference) {
        self.emit(Event::DownloadStarted { id: reference.id });
        tracing::info!(id = %reference.id, source_url = %reference.source_url, "downloading image");
    }

    /// Fetch and save, or fall back; no notification
    async fn attempt(&self, reference: &MediaReference) -> DownloadOutcome {
        let id = reference.id;
        match self.fetch_with_policy(reference).await {
            Ok(image) => {
                let payload = SavePayload {
                    file_name: file_name_for(
                        &self.config.file_prefix,
                        id,
                        &image.content_type,
                        self.config.extension_from_content_type,
                    ),
                    bytes: image.bytes,
                    content_type: image.content_type,
                };
                // The payload is consumed here; its buffer is released when save returns
                match self.saver.save(payload).await {
                    Ok(saved) => DownloadOutcome::Saved {
                        id,
                        location: saved.location,
                        bytes_written: saved.bytes_written,
                    },
                    Err(e) => self.fall_back(reference, Error::Save(e)).await,
                }
            }
            Err(e) => self.fall_back(reference, Error::Fetch(e)).await,
        }
    }

    fn finish(&self, outcome: &DownloadOutcome) {
        let id = outcome.id();
        match outcome {
            DownloadOutcome::Saved { .. } => {
                self.notifications
                    .success(format!("Image {} downloaded successfully!", id));
            }
            DownloadOutcome::OpenedFallback { .. } => {
                self.notifications.success(format!(
                    "Opened image {} in new tab. Right-click and save as...",
                    id
                ));
            }
            DownloadOutcome::Failed { .. } => {
                self.notifications.error(format!(
                    "Failed to download image {}. The URL may be expired.",
                    id
                ));
            }
        }

        self.emit(Event::DownloadFinished {
            outcome: outcome.clone(),
        });
    }

    async fn fetch_with_policy(
        &self,
        reference: &MediaReference,
    ) -> std::result::Result<crate::types::FetchedImage, crate::error::FetchError> {
        let source = self.source.clone();
        let url = reference.source_url.clone();
        with_retry(&self.config.retry, || {
            let source = source.clone();
            let url = url.clone();
            async move { source.fetch(&url).await }
        })
        .await
    }

    async fn fall_back(&self, reference: &MediaReference, cause: Error) -> DownloadOutcome {
        let id = reference.id;
        let url = self.source.manual_url(&reference.source_url);
        tracing::warn!(
            id = %id,
            error = %cause,
            code = cause.code(),
            "download failed, opening proxy URL"
        );

        match self.opener.open(&url).await {
            Ok(()) => DownloadOutcome::OpenedFallback { id, url },
            Err(open_err) => {
                tracing::warn!(id = %id, error = %open_err, "fallback open failed");
                DownloadOutcome::Failed {
                    id,
                    error: format!("{}; fallback: {}", cause, open_err),
                }
            }
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

fn abandoned(done: usize, total: usize) -> Error {
    tracing::info!(done, total, "bulk download stopped, image list was replaced");
    Error::Cancelled
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RecordingOpener, RecordingSaver, ScriptedSource};
    use crate::types::{MediaId, NotificationKind};
    use std::time::Duration;

    struct Harness {
        orchestrator: DownloadOrchestrator,
        source: Arc<ScriptedSource>,
        saver: Arc<RecordingSaver>,
        opener: Arc<RecordingOpener>,
        notifications: Arc<NotificationCenter>,
        events: broadcast::Receiver<Event>,
    }

    fn harness(source: ScriptedSource, opener: RecordingOpener) -> Harness {
        let (event_tx, events) = broadcast::channel(256);
        let notifications = Arc::new(NotificationCenter::new(
            Duration::from_secs(4),
            event_tx.clone(),
        ));
        let source = Arc::new(source);
        let saver = Arc::new(RecordingSaver::default());
        let opener = Arc::new(opener);
        let config = DownloadConfig {
            pacing_delay: Duration::from_secs(2),
            ..Default::default()
        };
        let orchestrator = DownloadOrchestrator::new(
            source.clone(),
            saver.clone(),
            opener.clone(),
            notifications.clone(),
            event_tx,
            config,
        );
        Harness {
            orchestrator,
            source,
            saver,
            opener,
            notifications,
            events,
        }
    }

    fn refs(n: u32) -> Vec<MediaReference> {
        MediaReference::from_urls((1..=n).map(|i| format!("https://cdn/{i}.jpg")).collect())
    }

    #[tokio::test]
    async fn saved_payload_matches_source_bytes() {
        let h = harness(
            ScriptedSource::ok_with(vec![7u8; 12_345], "image/jpeg"),
            RecordingOpener::working(),
        );
        let reference = &refs(1)[0];

        let outcome = h.orchestrator.download_one(reference).await;

        assert!(outcome.is_saved());
        let saved = h.saver.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].file_name, "instagram-image-1.jpg");
        assert_eq!(saved[0].bytes.len(), 12_345);
        assert_eq!(
            h.notifications.current().unwrap().message,
            "Image 1 downloaded successfully!"
        );
    }

    #[tokio::test]
    async fn name_is_jpg_even_for_png_by_default() {
        let h = harness(
            ScriptedSource::ok_with(vec![1, 2, 3], "image/png"),
            RecordingOpener::working(),
        );
        h.orchestrator.download_one(&refs(2)[1]).await;
        assert_eq!(h.saver.saved()[0].file_name, "instagram-image-2.jpg");
    }

    #[tokio::test]
    async fn fetch_failure_opens_proxy_url() {
        let h = harness(ScriptedSource::failing_ids(&[1]), RecordingOpener::working());
        let reference = &refs(1)[0];

        let outcome = h.orchestrator.download_one(reference).await;

        match outcome {
            DownloadOutcome::OpenedFallback { id, url } => {
                assert_eq!(id, MediaId(1));
                assert_eq!(url, h.source.manual_url("https://cdn/1.jpg"));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(
            h.opener.opened(),
            vec![h.source.manual_url("https://cdn/1.jpg")]
        );
        assert!(h.saver.saved().is_empty());
        let note = h.notifications.current().unwrap();
        assert_eq!(note.kind, NotificationKind::Success);
        assert!(note.message.contains("Right-click and save as"));
    }

    #[tokio::test]
    async fn save_failure_also_falls_back() {
        let h = harness(
            ScriptedSource::ok_with(vec![1], "image/jpeg"),
            RecordingOpener::working(),
        );
        h.saver.fail_next();

        let outcome = h.orchestrator.download_one(&refs(1)[0]).await;
        assert!(matches!(outcome, DownloadOutcome::OpenedFallback { .. }));
    }

    #[tokio::test]
    async fn failed_fallback_is_hard_failure() {
        let h = harness(ScriptedSource::failing_ids(&[1]), RecordingOpener::broken());

        let outcome = h.orchestrator.download_one(&refs(1)[0]).await;

        assert!(outcome.is_failed());
        let note = h.notifications.current().unwrap();
        assert_eq!(note.kind, NotificationKind::Error);
        assert_eq!(
            note.message,
            "Failed to download image 1. The URL may be expired."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_is_sequential_paced_and_isolates_failures() {
        let h = harness(ScriptedSource::failing_ids(&[2]), RecordingOpener::broken());
        let list = refs(4);
        let started = tokio::time::Instant::now();

        let summary = h.orchestrator.download_all(&list).await.unwrap();

        // Every item attempted, in order
        let calls = h.source.calls();
        let urls: Vec<&str> = calls.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn/1.jpg",
                "https://cdn/2.jpg",
                "https://cdn/3.jpg",
                "https://cdn/4.jpg",
            ]
        );

        // No overlap and at least the pacing delay between successive starts
        for pair in calls.windows(2) {
            assert!(pair[0].finished <= pair[1].started);
            assert!(pair[1].started - pair[0].finished >= Duration::from_secs(2));
        }

        // Three gaps, no trailing delay
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_secs(7), "took {elapsed:?}");

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.saved(), 3);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.outcomes[1].id(), MediaId(2));
        assert_eq!(
            h.notifications.current().unwrap().message,
            "Some images failed to download. Please try again."
        );
        assert!(!h.orchestrator.is_bulk_running());
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_all_saved_summary() {
        let mut h = harness(
            ScriptedSource::ok_with(vec![9; 10], "image/jpeg"),
            RecordingOpener::working(),
        );
        let summary = h.orchestrator.download_all(&refs(2)).await.unwrap();

        assert!(summary.all_saved());
        assert_eq!(
            h.notifications.current().unwrap().message,
            "All 2 images downloaded successfully!"
        );

        let mut saw_finished = false;
        while let Ok(event) = h.events.try_recv() {
            if let Event::BulkFinished { total, saved, failed, .. } = event {
                assert_eq!((total, saved, failed), (2, 2, 0));
                saw_finished = true;
            }
        }
        assert!(saw_finished);
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_rejects_reentry_while_running() {
        let h = harness(
            ScriptedSource::ok_with(vec![1], "image/jpeg"),
            RecordingOpener::working(),
        );
        let list = refs(3);

        let orchestrator = h.orchestrator.clone();
        let first_list = list.clone();
        let first = tokio::spawn(async move { orchestrator.download_all(&first_list).await });

        // Let the first run reach its first pacing sleep
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(h.orchestrator.is_bulk_running());

        let second = h.orchestrator.download_all(&list).await;
        assert!(matches!(second, Err(Error::BulkInProgress)));

        let summary = first.await.unwrap().unwrap();
        assert_eq!(summary.total(), 3);
        assert_eq!(h.source.calls().len(), 3, "rejected run did no work");
        assert!(!h.orchestrator.is_bulk_running());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_bulk_run_clears_flag() {
        let h = harness(
            ScriptedSource::ok_with(vec![1], "image/jpeg"),
            RecordingOpener::working(),
        );
        let list = refs(3);

        let orchestrator = h.orchestrator.clone();
        let task = tokio::spawn(async move { orchestrator.download_all(&list).await });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(h.orchestrator.is_bulk_running());

        task.abort();
        let _ = task.await;
        assert!(!h.orchestrator.is_bulk_running());
    }

    #[tokio::test]
    async fn empty_bulk_does_nothing() {
        let h = harness(
            ScriptedSource::ok_with(vec![1], "image/jpeg"),
            RecordingOpener::working(),
        );
        let summary = h.orchestrator.download_all(&[]).await.unwrap();
        assert_eq!(summary.total(), 0);
        assert!(h.notifications.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_policy_applies_to_transient_fetch_errors() {
        let (event_tx, _events) = broadcast::channel(64);
        let notifications = Arc::new(NotificationCenter::new(
            Duration::from_secs(4),
            event_tx.clone(),
        ));
        let source = Arc::new(ScriptedSource::transient_then_ok(2, vec![5; 8]));
        let saver = Arc::new(RecordingSaver::default());
        let config = DownloadConfig {
            retry: crate::config::RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                backoff_multiplier: 2.0,
                jitter: false,
            },
            ..Default::default()
        };
        let orchestrator = DownloadOrchestrator::new(
            source.clone(),
            saver.clone(),
            Arc::new(RecordingOpener::broken()),
            notifications,
            event_tx,
            config,
        );

        let outcome = orchestrator.download_one(&refs(1)[0]).await;
        assert!(outcome.is_saved());
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_bulk_stops_quietly_and_clears_flag() {
        let h = harness(
            ScriptedSource::ok_with(vec![1], "image/jpeg"),
            RecordingOpener::working(),
        );
        let cancel = CancellationToken::new();

        let orchestrator = h.orchestrator.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            orchestrator
                .download_all_with(&refs(3), &token, |_| {})
                .await
        });
        // Item 1 is done, the run sits in its first pacing sleep
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!h.orchestrator.is_bulk_running());
        assert_eq!(
            h.notifications.current().unwrap().message,
            "Image 1 downloaded successfully!"
        );

        // Long past the remaining pacing gaps: nothing else ran
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.source.calls().len(), 1);
        assert_eq!(h.saver.saved().len(), 1);

        // The flag is free for the next run
        let summary = h.orchestrator.download_all(&refs(1)).await.unwrap();
        assert!(summary.all_saved());
    }

    #[tokio::test]
    async fn cancelled_single_download_reports_nothing() {
        let mut h = harness(
            ScriptedSource::ok_with(vec![1], "image/jpeg"),
            RecordingOpener::working(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = h
            .orchestrator
            .download_one_until(&refs(1)[0], &cancel)
            .await;

        assert!(outcome.is_none());
        assert!(h.source.calls().is_empty());
        assert!(h.saver.saved().is_empty());
        assert!(h.notifications.current().is_none());
        assert!(h.events.try_recv().is_err());
    }
}
