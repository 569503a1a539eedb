//! Media kinds, the attachable-extension table, and transient media handles.
//!
//! Attachments forwarded to a human agent are downloaded into a temporary file that
//! is removed when the last handle is dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Kind of media a URL or attachment refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    File,
    Video,
    Audio,
}

/// Extensions accepted per media kind, in lookup order.
pub const ATTACHABLE_FORMATS: &[(MediaKind, &[&str])] = &[
    (MediaKind::Image, &["jpg", "jpeg", "png", "gif"]),
    (MediaKind::File, &["pdf", "xls", "xlsx", "doc", "docx"]),
    (MediaKind::Video, &["mp4", "avi"]),
    (MediaKind::Audio, &["mp3"]),
];

impl MediaKind {
    /// Channel attachment type name.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::File => "file",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Parse a channel attachment type (e.g. "image"). Other types (location, fallback) yield None.
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "image" => Some(MediaKind::Image),
            "file" => Some(MediaKind::File),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        ATTACHABLE_FORMATS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, exts)| *exts)
            .unwrap_or(&[])
    }

    /// Classify a URL by the text after its last dot. The match is exact, so a query
    /// string after the extension prevents a match.
    pub fn from_url_extension(url: &str) -> Option<Self> {
        let ext = url.rsplit('.').next()?;
        ATTACHABLE_FORMATS
            .iter()
            .find(|(_, exts)| exts.contains(&ext))
            .map(|(kind, _)| *kind)
    }

    /// First extension of this kind that appears as `.<ext>` anywhere in `url`.
    pub fn match_url(self, url: &str) -> Option<&'static str> {
        self.extensions()
            .iter()
            .find(|ext| url.contains(&format!(".{}", ext)))
            .copied()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("media download failed: {0}")]
    Status(String),
    #[error("writing media to temporary file: {0}")]
    Io(#[from] std::io::Error),
}

/// A downloaded attachment held in a temporary file.
#[derive(Debug, Clone)]
pub struct MediaHandle {
    pub kind: MediaKind,
    pub extension: String,
    pub source_url: String,
    file: Arc<NamedTempFile>,
}

impl MediaHandle {
    /// Write `bytes` to a fresh temporary file named `file<random>.<extension>`.
    pub fn from_bytes(
        kind: MediaKind,
        extension: &str,
        source_url: &str,
        bytes: &[u8],
    ) -> Result<Self, MediaError> {
        let mut file = tempfile::Builder::new()
            .prefix("file")
            .suffix(&format!(".{}", extension))
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            kind,
            extension: extension.to_string(),
            source_url: source_url.to_string(),
            file: Arc::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string()
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path())
    }
}

impl PartialEq for MediaHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path()
    }
}

/// Downloads attachment bytes.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError>;
}

/// Fetches media over HTTP(S).
#[derive(Clone, Default)]
pub struct HttpMediaFetcher {
    client: reqwest::Client,
}

impl HttpMediaFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let res = self.client.get(url).send().await?;
        if !res.status().is_success() {
            return Err(MediaError::Status(res.status().to_string()));
        }
        Ok(res.bytes().await?.to_vec())
    }
}
