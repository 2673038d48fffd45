//! UI side effects injected into the orchestrator and session
//!
//! The orchestrator never touches the file system, a browser or the
//! clipboard directly. It goes through two capabilities:
//!
//! - [`FileSaver`] - persist a payload as a named file
//! - [`LinkOpener`] - open a URL in a new browsing context, copy text to the clipboard
//!
//! Implementations shipped here:
//!
//! | Type | Capability | Behavior |
//! |------|------------|----------|
//! | [`DirectorySaver`] | [`FileSaver`] | writes into a directory with collision handling |
//! | [`SystemOpener`] | [`LinkOpener`] | runs the platform opener / clipboard tool |
//! | [`NoOpOpener`] | [`LinkOpener`] | always `NotSupported` |

use crate::config::{DownloadConfig, FileCollisionAction};
use crate::error::SaveError;
use crate::utils::get_unique_path;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Bytes to persist under a file name
///
/// The payload is moved into [`FileSaver::save`] and dropped when the call
/// returns, so no buffer outlives a single save.
#[derive(Clone, Debug)]
pub struct SavePayload {
    /// Suggested file name (no directory part)
    pub file_name: String,
    /// Image bytes
    pub bytes: Bytes,
    /// Content type reported by the proxy
    pub content_type: String,
}

/// Where a saver put a file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedFile {
    /// Saver-specific location (a path for [`DirectorySaver`])
    pub location: String,
    /// Number of bytes written
    pub bytes_written: u64,
}

/// "Save bytes as file" capability
#[async_trait]
pub trait FileSaver: Send + Sync {
    /// Persist the payload
    async fn save(&self, payload: SavePayload) -> Result<SavedFile, SaveError>;
}

/// Manual-save affordances: open a URL elsewhere, copy text for the user
#[async_trait]
pub trait LinkOpener: Send + Sync {
    /// Open `url` in a new browsing context
    async fn open(&self, url: &str) -> Result<(), SaveError>;

    /// Put `text` on the clipboard
    async fn copy_to_clipboard(&self, _text: &str) -> Result<(), SaveError> {
        Err(SaveError::NotSupported(
            "clipboard access is not available".into(),
        ))
    }
}

/// Saves files into a directory
#[derive(Clone, Debug)]
pub struct DirectorySaver {
    dir: PathBuf,
    collision: FileCollisionAction,
}

impl DirectorySaver {
    /// Create a saver writing into `dir`
    pub fn new(dir: impl Into<PathBuf>, collision: FileCollisionAction) -> Self {
        Self {
            dir: dir.into(),
            collision,
        }
    }

    /// Create a saver from the download settings
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self::new(config.download_dir.clone(), config.file_collision)
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl FileSaver for DirectorySaver {
    async fn save(&self, payload: SavePayload) -> Result<SavedFile, SaveError> {
        // A name like "../x" must not escape the directory
        let file_name = Path::new(&payload.file_name)
            .file_name()
            .ok_or_else(|| SaveError::InvalidPath {
                path: PathBuf::from(&payload.file_name),
                reason: "file name has no final component".to_string(),
            })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SaveError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let target = get_unique_path(&self.dir.join(file_name), self.collision)?;

        tokio::fs::write(&target, &payload.bytes)
            .await
            .map_err(|source| SaveError::Io {
                path: target.clone(),
                source,
            })?;

        tracing::info!(path = %target.display(), size = payload.bytes.len(), "image saved");
        Ok(SavedFile {
            location: target.display().to_string(),
            bytes_written: payload.bytes.len() as u64,
        })
    }
}

/// Opens URLs and copies text using the platform's command-line tools
///
/// Discovered through `PATH`: `xdg-open`/`open` for URLs and
/// `wl-copy`/`xclip`/`pbcopy` for the clipboard.
#[derive(Clone, Debug, Default)]
pub struct SystemOpener {
    opener: Option<PathBuf>,
    clipboard: Option<(PathBuf, Vec<&'static str>)>,
}

impl SystemOpener {
    /// Create an opener with explicit binaries
    pub fn new(opener: Option<PathBuf>, clipboard: Option<(PathBuf, Vec<&'static str>)>) -> Self {
        Self { opener, clipboard }
    }

    /// Look the tools up in `PATH`
    pub fn from_path() -> Self {
        let opener = ["xdg-open", "open"]
            .iter()
            .find_map(|name| which::which(name).ok());

        let clipboard = [
            ("wl-copy", vec![]),
            ("xclip", vec!["-selection", "clipboard"]),
            ("pbcopy", vec![]),
        ]
        .into_iter()
        .find_map(|(name, args)| which::which(name).ok().map(|path| (path, args)));

        tracing::debug!(opener = ?opener, clipboard = ?clipboard, "system opener discovered");
        Self { opener, clipboard }
    }
}

#[async_trait]
impl LinkOpener for SystemOpener {
    async fn open(&self, url: &str) -> Result<(), SaveError> {
        let opener = self.opener.as_ref().ok_or_else(|| SaveError::OpenFailed {
            url: url.to_string(),
            reason: "no URL opener found in PATH".to_string(),
        })?;

        let status = Command::new(opener)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| SaveError::OpenFailed {
                url: url.to_string(),
                reason: format!("failed to run {}: {}", opener.display(), e),
            })?;

        if !status.success() {
            return Err(SaveError::OpenFailed {
                url: url.to_string(),
                reason: format!("{} exited with {:?}", opener.display(), status.code()),
            });
        }
        Ok(())
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), SaveError> {
        let (program, args) = self.clipboard.as_ref().ok_or_else(|| {
            SaveError::ClipboardFailed("no clipboard tool found in PATH".to_string())
        })?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                SaveError::ClipboardFailed(format!("failed to run {}: {}", program.display(), e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| SaveError::ClipboardFailed(e.to_string()))?;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| SaveError::ClipboardFailed(e.to_string()))?;
        if !status.success() {
            return Err(SaveError::ClipboardFailed(format!(
                "{} exited with {:?}",
                program.display(),
                status.code()
            )));
        }
        Ok(())
    }
}

/// Opener for headless environments; every call is `NotSupported`
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpOpener;

#[async_trait]
impl LinkOpener for NoOpOpener {
    async fn open(&self, url: &str) -> Result<(), SaveError> {
        Err(SaveError::NotSupported(format!(
            "cannot open {} without a browser",
            url
        )))
    }
}
