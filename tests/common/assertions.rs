//! Waiting helpers for event-driven assertions

use insta_media_dl::{Event, MediaId};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of waiting for eager image fetches
#[derive(Debug, PartialEq, Eq)]
pub enum WaitResult {
    /// Every image reached Loaded or Failed
    Settled {
        /// Ids that loaded
        loaded: Vec<MediaId>,
        /// Ids that failed
        failed: Vec<MediaId>,
    },
    /// Timeout waiting for the images
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait until `count` distinct images loaded or failed
///
/// Subscribe before submitting, or early events are missed.
pub async fn wait_for_images(
    events: &mut broadcast::Receiver<Event>,
    count: usize,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        let mut loaded = Vec::new();
        let mut failed = Vec::new();
        let mut seen = HashSet::new();
        while seen.len() < count {
            match events.recv().await {
                Ok(Event::ImageLoaded { id, .. }) => {
                    if seen.insert(id) {
                        loaded.push(id);
                    }
                }
                Ok(Event::ImageFailed { id, .. }) => {
                    if seen.insert(id) {
                        failed.push(id);
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
        loaded.sort();
        failed.sort();
        WaitResult::Settled { loaded, failed }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Drain events until `predicate` matches one, returning everything seen
pub async fn collect_events_until<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut predicate: F,
) -> Vec<Event>
where
    F: FnMut(&Event) -> bool,
{
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let done = predicate(&event);
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await;
    seen
}
