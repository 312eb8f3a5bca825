//! Project identity and structured metadata.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::media::{MediaKind, MediaManifestEntry};
use crate::error::BundleError;

/// Longest identifier accepted by the registry
const MAX_ID_LEN: usize = 128;

/// Filesystem-safe project identifier.
///
/// Parsing is pure: an identifier that could escape the registry root is
/// rejected before any path is built from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    /// Parse and validate a raw identifier
    pub fn parse(raw: &str) -> Result<Self, BundleError> {
        let id = raw.trim();

        if id.is_empty() {
            return Err(BundleError::InvalidProjectId {
                id: raw.to_string(),
                reason: "identifier is empty",
            });
        }

        if id.contains("..")
            || id.contains('/')
            || id.contains('\\')
            || id.contains(':')
            || id.contains('\0')
            || Path::new(id).is_absolute()
        {
            return Err(BundleError::PathTraversal(raw.to_string()));
        }

        if id.len() > MAX_ID_LEN {
            return Err(BundleError::InvalidProjectId {
                id: raw.to_string(),
                reason: "identifier is too long",
            });
        }

        if id.starts_with('.') {
            return Err(BundleError::InvalidProjectId {
                id: raw.to_string(),
                reason: "identifier must not start with a dot",
            });
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(BundleError::InvalidProjectId {
                id: raw.to_string(),
                reason: "only ASCII letters, digits, '-', '_' and '.' are allowed",
            });
        }

        Ok(Self(id.to_string()))
    }

    /// Get the raw string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProjectId {
    type Error = BundleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

/// How a project is represented on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    /// Directory with a metadata file, source text and sibling media files
    LegacyMultiFile,

    /// Directory holding one self-describing container file
    SingleFileContainer,
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectKind::LegacyMultiFile => write!(f, "legacy"),
            ProjectKind::SingleFileContainer => write!(f, "container"),
        }
    }
}

/// Structured project metadata.
///
/// This is the exact payload of the container's metadata block, so it must
/// survive a serialize/escape/unescape/deserialize round trip unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Project name (the identifier it was built under)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// When the project was first built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// When the metadata was last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Narration voice name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,

    #[serde(default, alias = "lang", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Container format version that wrote this block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,

    /// What the container carries for each media kind
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub media: BTreeMap<MediaKind, MediaManifestEntry>,
}

impl ProjectMetadata {
    /// Create metadata with just a title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_font_size(mut self, font_size: u32) -> Self {
        self.font_size = Some(font_size);
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add multiple tags
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Overlay the fields that `update` sets onto `self`.
    ///
    /// Identity fields (`name`, `created_at`) and the media manifest are
    /// owned by the builder and are never taken from `update`.
    pub fn merge(&mut self, update: &ProjectMetadata) {
        fn overlay<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if let Some(value) = src {
                *dst = Some(value.clone());
            }
        }

        overlay(&mut self.title, &update.title);
        overlay(&mut self.theme, &update.theme);
        overlay(&mut self.template, &update.template);
        overlay(&mut self.voice, &update.voice);
        overlay(&mut self.font_size, &update.font_size);
        overlay(&mut self.language, &update.language);
        if !update.tags.is_empty() {
            self.tags = update.tags.clone();
        }
    }

    /// Title to display, falling back to the project name
    pub fn display_title(&self) -> Option<&str> {
        self.title.as_deref().or(self.name.as_deref())
    }

    /// Read metadata written by older tools.
    ///
    /// Accepts the strict schema first when the block is versioned. Anything else (frontmatter, legacy
    /// `metadata.json`, blocks with a differently shaped `media` map) is read
    /// field by field: unknown keys are ignored, `lang`/`fontSize`/`date`
    /// aliases are honoured and a nested `meta` object fills gaps.
    pub fn from_loose_value(value: &Value) -> Self {
        // Only blocks we wrote ourselves carry a format version
        if value.get("format_version").is_some() {
            if let Ok(strict) = serde_json::from_value::<ProjectMetadata>(value.clone()) {
                return strict;
            }
        }

        let nested = value.get("meta");
        let field = |keys: &[&str]| -> Option<&Value> {
            keys.iter()
                .find_map(|k| value.get(*k).filter(|v| !v.is_null()))
                .or_else(|| {
                    nested.and_then(|m| keys.iter().find_map(|k| m.get(*k).filter(|v| !v.is_null())))
                })
        };
        let text = |keys: &[&str]| -> Option<String> {
            field(keys).and_then(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };

        let font_size = field(&["font_size", "fontSize"]).and_then(|v| match v {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        let tags = match field(&["tags"]) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|t| t.as_str())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            _ => Vec::new(),
        };

        Self {
            name: text(&["name"]),
            title: text(&["title"]),
            created_at: text(&["created_at", "created", "date"]).and_then(|s| parse_timestamp(&s)),
            modified_at: text(&["modified_at", "modified"]).and_then(|s| parse_timestamp(&s)),
            theme: text(&["theme"]),
            template: text(&["template"]),
            voice: text(&["voice"]),
            font_size,
            language: text(&["language", "lang"]),
            tags,
            format_version: text(&["format_version", "version"]),
            media: BTreeMap::new(),
        }
    }
}

/// Parse RFC 3339, a naive ISO timestamp (assumed UTC) or a bare date
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let trimmed = raw.trim_end_matches('Z');
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
