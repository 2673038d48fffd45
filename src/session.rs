//! One user's lookup session: resolve a post, show its images, download them.
//!
//! [`Session`] owns the image list and wires the resolver, fetcher and
//! orchestrator together. Every submit starts a new *generation*; results
//! that belong to an older generation (a slow resolution, an image fetch
//! still in flight) are dropped instead of being written into the new list.

use crate::capabilities::{DirectorySaver, FileSaver, LinkOpener, SystemOpener};
use crate::config::Config;
use crate::error::{Error, FetchError, Result};
use crate::fetcher::{ImageFetcher, ImageSource};
use crate::notifications::NotificationCenter;
use crate::orchestrator::DownloadOrchestrator;
use crate::presentation::SessionView;
use crate::resolver::MediaResolver;
use crate::types::{
    BulkSummary, DownloadOutcome, Event, FetchedImage, ImageEntry, MediaId, MediaReference,
    Notification,
};
use crate::utils::build_http_client;
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

struct SessionState {
    generation: u64,
    cancel: CancellationToken,
    entries: Vec<ImageEntry>,
    loading: bool,
    inline_error: Option<String>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            generation: 0,
            cancel: CancellationToken::new(),
            entries: Vec::new(),
            loading: false,
            inline_error: None,
        }
    }

    /// Invalidate the current generation and start a new, empty one
    fn begin(&mut self) -> (u64, CancellationToken) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation += 1;
        self.entries.clear();
        self.inline_error = None;
        self.loading = true;
        (self.generation, self.cancel.clone())
    }

    fn entry(&self, id: MediaId) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    fn entry_mut(&mut self, id: MediaId) -> Option<&mut ImageEntry> {
        self.entries.iter_mut().find(|e| e.id() == id)
    }
}

type SharedState = Arc<Mutex<SessionState>>;

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    // Every update is a single assignment or state transition, so a poisoned
    // lock still holds consistent data
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears `loading` if a submit is dropped while its resolution is in flight
struct LoadingGuard<'a> {
    state: &'a Mutex<SessionState>,
    generation: u64,
    armed: bool,
}

impl<'a> LoadingGuard<'a> {
    fn new(state: &'a Mutex<SessionState>, generation: u64) -> Self {
        Self {
            state,
            generation,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock(self.state);
        // A newer submit owns the flag now
        if state.generation == self.generation {
            state.loading = false;
        }
    }
}

/// Apply an eager fetch result if it still belongs to the current generation
fn apply_fetch(
    state: &Mutex<SessionState>,
    generation: u64,
    cancel: &CancellationToken,
    id: MediaId,
    result: std::result::Result<FetchedImage, FetchError>,
    event_tx: &broadcast::Sender<Event>,
) {
    let mut state = lock(state);
    if state.generation != generation || cancel.is_cancelled() {
        tracing::debug!(id = %id, generation, "dropping stale fetch result");
        return;
    }
    let Some(entry) = state.entry_mut(id) else {
        return;
    };

    let event = match result {
        Ok(image) => {
            let size = image.len();
            let content_type = image.content_type.clone();
            if !entry.mark_loaded(image) {
                return;
            }
            tracing::debug!(id = %id, size, "image loaded");
            Event::ImageLoaded {
                id,
                size,
                content_type,
            }
        }
        Err(e) => {
            if !entry.mark_failed() {
                return;
            }
            tracing::warn!(id = %id, error = %e, "image failed to load");
            Event::ImageFailed {
                id,
                error: e.to_string(),
            }
        }
    };
    drop(state);
    event_tx.send(event).ok();
}

/// Mark a still-Pending entry Failed after a hard download failure
fn record_outcome(
    state: &Mutex<SessionState>,
    generation: u64,
    outcome: &DownloadOutcome,
    event_tx: &broadcast::Sender<Event>,
) {
    let DownloadOutcome::Failed { id, error } = outcome else {
        return;
    };
    let mut state = lock(state);
    if state.generation != generation {
        return;
    }
    let changed = state.entry_mut(*id).is_some_and(ImageEntry::mark_failed);
    drop(state);
    if changed {
        event_tx
            .send(Event::ImageFailed {
                id: *id,
                error: error.clone(),
            })
            .ok();
    }
}

/// Builder for [`Session`] with replaceable capabilities
///
/// Anything not set falls back to the production implementation:
/// [`ImageFetcher`], [`DirectorySaver`] and [`SystemOpener`].
pub struct SessionBuilder {
    config: Config,
    source: Option<Arc<dyn ImageSource>>,
    saver: Option<Arc<dyn FileSaver>>,
    opener: Option<Arc<dyn LinkOpener>>,
}

impl SessionBuilder {
    /// Use a custom image source
    pub fn image_source(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Use a custom file saver
    pub fn saver(mut self, saver: Arc<dyn FileSaver>) -> Self {
        self.saver = Some(saver);
        self
    }

    /// Use a custom opener (fallback and clipboard)
    pub fn opener(mut self, opener: Arc<dyn LinkOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Validate the config and build the session
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid config and
    /// [`Error::Network`] if the HTTP client cannot be built.
    pub fn build(self) -> Result<Session> {
        let config = self.config;
        config.validate()?;

        let client = build_http_client(&config.backend)?;
        let resolver = MediaResolver::with_client(client.clone(), &config.backend);

        let source: Arc<dyn ImageSource> = match self.source {
            Some(source) => source,
            None => Arc::new(ImageFetcher::with_client(client, &config.backend)),
        };
        let saver: Arc<dyn FileSaver> = match self.saver {
            Some(saver) => saver,
            None => Arc::new(DirectorySaver::from_config(&config.download)),
        };
        let opener: Arc<dyn LinkOpener> = match self.opener {
            Some(opener) => opener,
            None => Arc::new(SystemOpener::from_path()),
        };

        let (event_tx, _rx) = broadcast::channel(config.notifications.event_capacity);
        let notifications = Arc::new(NotificationCenter::new(
            config.notifications.display_duration,
            event_tx.clone(),
        ));
        let orchestrator = DownloadOrchestrator::new(
            source.clone(),
            saver,
            opener.clone(),
            notifications.clone(),
            event_tx.clone(),
            config.download.clone(),
        );

        tracing::info!(backend = %config.backend.base_url, "session created");
        Ok(Session {
            config: Arc::new(config),
            resolver,
            source,
            opener,
            orchestrator,
            notifications,
            event_tx,
            state: Arc::new(Mutex::new(SessionState::new())),
        })
    }
}

/// A lookup session
///
/// All methods take `&self`; a session can be shared behind an `Arc` and
/// driven from several tasks. Dropping it cancels any image fetches still
/// running for the current list.
pub struct Session {
    config: Arc<Config>,
    resolver: MediaResolver,
    source: Arc<dyn ImageSource>,
    opener: Arc<dyn LinkOpener>,
    orchestrator: DownloadOrchestrator,
    notifications: Arc<NotificationCenter>,
    event_tx: broadcast::Sender<Event>,
    state: SharedState,
}

impl Session {
    /// Create a session with the production capabilities
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Start building a session
    pub fn builder(config: Config) -> SessionBuilder {
        SessionBuilder {
            config,
            source: None,
            saver: None,
            opener: None,
        }
    }

    /// Resolve a post URL and replace the image list with its media
    ///
    /// Returns the number of images found. Image bytes are fetched in the
    /// background afterwards; watch [`Event::ImageLoaded`] /
    /// [`Event::ImageFailed`] or poll [`entries`](Self::entries).
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for blank input (no request is made)
    /// - [`Error::Resolution`] if the backend could not resolve the post;
    ///   the list stays empty and [`inline_error`](Self::inline_error) holds the reason
    /// - [`Error::Superseded`] if another submit started before this one finished
    ///
    /// Starting a submit also stops any download still running for the old
    /// list; that download returns [`Error::Cancelled`].
    pub async fn submit(&self, post_url: &str) -> Result<usize> {
        if post_url.trim().is_empty() {
            self.notifications.error("Please enter an Instagram post URL");
            return Err(Error::Validation("post URL is empty".to_string()));
        }

        let (generation, cancel) = lock(&self.state).begin();
        tracing::info!(generation, post_url = %post_url, "submitting post");
        self.emit(Event::ResolveStarted {
            post_url: post_url.to_string(),
        });

        let mut loading = LoadingGuard::new(&self.state, generation);
        let result = self.resolver.resolve(post_url).await;
        loading.disarm();

        let mut state = lock(&self.state);
        if state.generation != generation {
            tracing::debug!(
                generation,
                current = state.generation,
                "discarding superseded resolution"
            );
            return Err(Error::Superseded);
        }
        state.loading = false;

        match result {
            Ok(references) => {
                let count = references.len();
                state.entries = references.iter().cloned().map(ImageEntry::new).collect();
                drop(state);

                self.emit(Event::Resolved { count });
                self.notifications
                    .success(format!("Successfully loaded {} images!", count));
                self.spawn_fetches(generation, cancel, references);
                Ok(count)
            }
            Err(e) => {
                let reason = e.reason();
                state.inline_error = Some(reason.clone());
                drop(state);

                tracing::warn!(error = %e, "resolution failed");
                self.emit(Event::ResolutionFailed { error: reason });
                self.notifications
                    .error("Failed to load images. Please check the URL and try again.");
                Err(Error::Resolution(e))
            }
        }
    }

    fn spawn_fetches(
        &self,
        generation: u64,
        cancel: CancellationToken,
        references: Vec<MediaReference>,
    ) {
        if references.is_empty() {
            return;
        }
        let source = self.source.clone();
        let state = self.state.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let fetches = references.into_iter().map(|reference| {
                let source = source.clone();
                let state = state.clone();
                let event_tx = event_tx.clone();
                let cancel = cancel.clone();
                async move {
                    let result = source.fetch(&reference.source_url).await;
                    apply_fetch(&state, generation, &cancel, reference.id, result, &event_tx);
                }
            });
            let fetches = join_all(fetches);

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(generation, "image fetches cancelled");
                }
                _ = fetches => {}
            }
        });
    }

    /// Download one image
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the id is not in the current list
    /// - [`Error::BulkInProgress`] while [`download_all`](Self::download_all) runs
    /// - [`Error::Cancelled`] if a new submit replaced the list mid-download
    pub async fn download(&self, id: impl Into<MediaId>) -> Result<DownloadOutcome> {
        let id = id.into();
        if self.orchestrator.is_bulk_running() {
            return Err(Error::BulkInProgress);
        }
        let (reference, generation, cancel) = {
            let state = lock(&self.state);
            let entry = state.entry(id).ok_or(Error::NotFound(id))?;
            (entry.reference.clone(), state.generation, state.cancel.clone())
        };

        let outcome = self
            .orchestrator
            .download_one_until(&reference, &cancel)
            .await
            .ok_or(Error::Cancelled)?;
        record_outcome(&self.state, generation, &outcome, &self.event_tx);
        Ok(outcome)
    }

    /// Download every image in the list, in order, one at a time
    ///
    /// # Errors
    ///
    /// - [`Error::BulkInProgress`] if a bulk run is already going
    /// - [`Error::Cancelled`] if a new submit replaced the list mid-run; the
    ///   bulk flag is cleared and no summary notification is shown
    pub async fn download_all(&self) -> Result<BulkSummary> {
        let (references, generation, cancel) = {
            let state = lock(&self.state);
            let references: Vec<MediaReference> =
                state.entries.iter().map(|e| e.reference.clone()).collect();
            (references, state.generation, state.cancel.clone())
        };

        let state = self.state.clone();
        let event_tx = self.event_tx.clone();
        self.orchestrator
            .download_all_with(&references, &cancel, move |outcome| {
                record_outcome(&state, generation, outcome, &event_tx)
            })
            .await
    }

    /// Copy an image's source URL to the clipboard
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the id is not in the current list
    /// - [`Error::Save`] if the clipboard is unavailable
    pub async fn copy_url(&self, id: impl Into<MediaId>) -> Result<()> {
        let id = id.into();
        let url = {
            let state = lock(&self.state);
            state
                .entry(id)
                .map(|e| e.reference.source_url.clone())
                .ok_or(Error::NotFound(id))?
        };

        match self.opener.copy_to_clipboard(&url).await {
            Ok(()) => {
                self.notifications.success("Image URL copied to clipboard!");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "copy to clipboard failed");
                self.notifications
                    .error("Could not copy the image URL. Please copy it manually.");
                Err(e.into())
            }
        }
    }

    /// Snapshot of the image list
    pub fn entries(&self) -> Vec<ImageEntry> {
        lock(&self.state).entries.clone()
    }

    /// Snapshot of everything needed to render the session
    pub fn view(&self) -> SessionView {
        let notification = self.notifications.current();
        let state = lock(&self.state);
        SessionView::new(
            &state.entries,
            state.loading,
            self.orchestrator.is_bulk_running(),
            state.inline_error.clone(),
            notification,
        )
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Whether a resolution is in flight
    pub fn is_loading(&self) -> bool {
        lock(&self.state).loading
    }

    /// Whether a bulk download is in flight
    pub fn is_bulk_running(&self) -> bool {
        self.orchestrator.is_bulk_running()
    }

    /// Reason the last resolution failed, until the next submit
    pub fn inline_error(&self) -> Option<String> {
        lock(&self.state).inline_error.clone()
    }

    /// The visible notification
    pub fn notification(&self) -> Option<Notification> {
        self.notifications.current()
    }

    /// Hide the visible notification
    pub fn dismiss_notification(&self) {
        self.notifications.dismiss();
    }

    /// The configuration this session was built with
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        lock(&self.state).cancel.cancel();
    }
}
