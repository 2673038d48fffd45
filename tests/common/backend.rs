//! Mock backend and capabilities for integration tests

use async_trait::async_trait;
use insta_media_dl::{Config, FileCollisionAction, LinkOpener, SaveError};
use serde_json::json;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Smallest byte sequence that sniffs as JPEG
pub const JPEG_BYTES: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// PNG signature
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// `POST /download` for `post_url` answers with `media`
pub async fn mount_post(server: &MockServer, post_url: &str, media: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/download"))
        .and(body_json(json!({ "url": post_url })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "media": media })),
        )
        .mount(server)
        .await;
}

/// `POST /download` for `post_url` is rejected with `error`
pub async fn mount_rejection(server: &MockServer, post_url: &str, error: &str) {
    Mock::given(method("POST"))
        .and(path("/download"))
        .and(body_json(json!({ "url": post_url })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": false, "error": error })),
        )
        .mount(server)
        .await;
}

/// `GET /proxy-image?url=<source>` answers with `body`
pub async fn mount_image(server: &MockServer, source: &str, body: &[u8], content_type: &str) {
    Mock::given(method("GET"))
        .and(path("/proxy-image"))
        .and(query_param("url", source))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", content_type)
                .set_body_bytes(body.to_vec()),
        )
        .mount(server)
        .await;
}

/// `GET /proxy-image?url=<source>` answers with `status`
pub async fn mount_image_status(server: &MockServer, source: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path("/proxy-image"))
        .and(query_param("url", source))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Config pointing at `server`, saving into `dir`, with short pacing
pub fn test_config(server: &MockServer, dir: &Path) -> Config {
    let mut config = Config::with_base_url(server.uri());
    config.backend.request_timeout = Duration::from_secs(5);
    config.download.download_dir = dir.to_path_buf();
    config.download.file_collision = FileCollisionAction::Rename;
    config.download.pacing_delay = Duration::from_millis(20);
    config
}

/// Opener that records what it was asked to open
#[derive(Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<String>>,
}

impl RecordingOpener {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkOpener for RecordingOpener {
    async fn open(&self, url: &str) -> Result<(), SaveError> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}
