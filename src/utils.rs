//! Utility functions for endpoints, file naming and path collisions

use crate::config::{BackendConfig, FileCollisionAction};
use crate::error::{Error, Result, SaveError};
use crate::types::MediaId;
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Build the HTTP client shared by the resolver and fetcher
///
/// The client carries the configured request timeout, so a silent backend
/// surfaces as a timeout error instead of hanging the caller.
pub(crate) fn build_http_client(config: &BackendConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(Error::Network)
}

/// Join an endpoint path onto the backend base URL
///
/// # Examples
///
/// ```
/// use insta_media_dl::utils::endpoint_url;
///
/// assert_eq!(
///     endpoint_url("https://x.ngrok-free.app/", "download"),
///     "https://x.ngrok-free.app/download"
/// );
/// assert_eq!(
///     endpoint_url("http://127.0.0.1:8000", "/download"),
///     "http://127.0.0.1:8000/download"
/// );
/// ```
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Proxy URL that re-serves `source_url` from the backend's origin
///
/// # Examples
///
/// ```
/// use insta_media_dl::utils::proxy_url;
///
/// assert_eq!(
///     proxy_url("http://127.0.0.1:8000", "https://cdn.example.com/a b.jpg?x=1&y=2"),
///     "http://127.0.0.1:8000/proxy-image?url=https%3A%2F%2Fcdn.example.com%2Fa%20b.jpg%3Fx%3D1%26y%3D2"
/// );
/// ```
pub fn proxy_url(base_url: &str, source_url: &str) -> String {
    format!(
        "{}?url={}",
        endpoint_url(base_url, "proxy-image"),
        urlencoding::encode(source_url)
    )
}

/// File extension for a content type, falling back to `jpg`
///
/// Parameters such as `; charset=binary` are ignored.
#[must_use]
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        _ => "jpg",
    }
}

/// File name for a saved image: `<prefix>-<id>.<ext>`
///
/// With `from_content_type = false` the extension is always `jpg`,
/// whatever the proxy reported.
#[must_use]
pub fn file_name_for(
    prefix: &str,
    id: MediaId,
    content_type: &str,
    from_content_type: bool,
) -> String {
    let extension = if from_content_type {
        extension_for_content_type(content_type)
    } else {
        "jpg"
    };
    format!("{}-{}.{}", prefix, id, extension)
}

/// Get a unique path for a file, handling collisions according to the specified action
///
/// For Rename, a ` (n)` suffix is added before the extension until a free
/// name is found. For Skip, an existing file is an error. For Overwrite, the
/// path is returned unchanged.
///
/// # Examples
///
/// ```
/// use insta_media_dl::utils::get_unique_path;
/// use insta_media_dl::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/instagram-image-1.jpg");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// // If /tmp/instagram-image-1.jpg exists, returns /tmp/instagram-image-1 (1).jpg
/// ```
pub fn get_unique_path(
    path: &Path,
    action: FileCollisionAction,
) -> std::result::Result<PathBuf, SaveError> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(SaveError::Collision {
                    path: path.to_path_buf(),
                    reason: "File already exists and collision action is Skip".to_string(),
                });
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
                SaveError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "Cannot extract file stem".to_string(),
                }
            })?;

            let extension = path.extension().and_then(|e| e.to_str());

            let parent = path.parent().ok_or_else(|| SaveError::InvalidPath {
                path: path.to_path_buf(),
                reason: "Cannot extract parent directory".to_string(),
            })?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(SaveError::Collision {
                path: path.to_path_buf(),
                reason: format!(
                    "Could not find unique filename after {} attempts",
                    MAX_RENAME_ATTEMPTS
                ),
            })
        }
    }
}
