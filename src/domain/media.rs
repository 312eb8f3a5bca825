//! Media kinds carried by a container.

use serde::{Deserialize, Serialize};

/// The fixed set of media a project can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Thumbnail,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Video, MediaKind::Audio, MediaKind::Thumbnail];

    /// `id` attribute of the container element carrying this media
    pub fn element_id(&self) -> &'static str {
        match self {
            MediaKind::Video => "media-video",
            MediaKind::Audio => "media-audio",
            MediaKind::Thumbnail => "thumb",
        }
    }

    /// MIME top-level type this kind must use
    pub fn mime_family(&self) -> &'static str {
        match self {
            MediaKind::Video => "video/",
            MediaKind::Audio => "audio/",
            MediaKind::Thumbnail => "image/",
        }
    }

    /// Whether a MIME type is acceptable for this kind
    pub fn accepts_mime(&self, mime: &str) -> bool {
        mime.starts_with(self.mime_family())
    }

    pub fn from_element_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.element_id() == id)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            "thumbnail" | "thumb" | "image" => Ok(MediaKind::Thumbnail),
            _ => Err(format!("Unknown media kind: {}", s)),
        }
    }
}

/// Manifest entry recorded in the metadata block for one media kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaManifestEntry {
    pub mime: String,

    /// Raw payload size (before base64)
    pub bytes: u64,

    /// Relative sibling path when the media is linked rather than embedded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl MediaManifestEntry {
    pub fn is_embedded(&self) -> bool {
        self.link.is_none()
    }
}

/// Where a media element's payload lives, as written in its source attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Inline `data:<mime>;base64,<payload>` URI (kept undecoded)
    DataUri(String),

    /// Path relative to the project directory
    Relative(String),
}

impl MediaSource {
    /// Classify a raw `src`/`href` attribute value
    pub fn from_attribute(value: &str) -> Self {
        let value = value.trim();
        if value.starts_with("data:") {
            MediaSource::DataUri(value.to_string())
        } else {
            MediaSource::Relative(value.to_string())
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, MediaSource::DataUri(_))
    }
}
