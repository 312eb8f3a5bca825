//! Container builder: metadata + media in, well-formed SVG document out.

use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use tracing::{debug, instrument};

use super::datauri;
use super::escape::escape;
use super::{FORMAT_VERSION, SVG_NS, XHTML_NS, XLINK_NS, YTB_NS};
use crate::config::BuildLimits;
use crate::domain::{MediaKind, MediaManifestEntry, ProjectId, ProjectMetadata};
use crate::error::BuildError;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const DEFAULT_TEMPLATE: &str = "classic";
const DEFAULT_TITLE_FONT_SIZE: u32 = 48;

/// Where one media payload comes from
#[derive(Debug, Clone)]
pub enum AssetSource {
    /// In-memory payload, embedded as a data URI
    Bytes {
        data: Vec<u8>,
        file_name: Option<String>,
    },

    /// File on disk, read and embedded as a data URI
    File(PathBuf),

    /// Sibling file referenced by a relative path, not embedded
    Link(String),
}

impl AssetSource {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        AssetSource::Bytes {
            data: data.into(),
            file_name: None,
        }
    }

    pub fn named_bytes(data: impl Into<Vec<u8>>, file_name: impl Into<String>) -> Self {
        AssetSource::Bytes {
            data: data.into(),
            file_name: Some(file_name.into()),
        }
    }
}

/// Everything a build consumes besides metadata
#[derive(Debug, Clone, Default)]
pub struct BuildAssets {
    pub video: Option<AssetSource>,
    pub audio: Option<AssetSource>,
    pub thumbnail: Option<AssetSource>,

    /// Source text the media was generated from
    pub source_text: String,
}

impl BuildAssets {
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            ..Default::default()
        }
    }

    pub fn with_video(mut self, source: AssetSource) -> Self {
        self.video = Some(source);
        self
    }

    pub fn with_audio(mut self, source: AssetSource) -> Self {
        self.audio = Some(source);
        self
    }

    pub fn with_thumbnail(mut self, source: AssetSource) -> Self {
        self.thumbnail = Some(source);
        self
    }

    pub fn get(&self, kind: MediaKind) -> Option<&AssetSource> {
        match kind {
            MediaKind::Video => self.video.as_ref(),
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Thumbnail => self.thumbnail.as_ref(),
        }
    }
}

/// Output of a successful build
#[derive(Debug, Clone)]
pub struct BuiltContainer {
    /// The complete SVG document
    pub document: String,

    /// Metadata exactly as written into the block
    pub metadata: ProjectMetadata,

    /// Total base64 bytes embedded
    pub embedded_bytes: u64,
}

/// A media payload after resolution
enum ResolvedMedia {
    Embedded { mime: String, data: Vec<u8> },
    Linked { mime: String, path: String },
}

impl ResolvedMedia {
    /// Value for the element's source attribute
    fn source_attr(&self) -> String {
        match self {
            ResolvedMedia::Embedded { mime, data } => datauri::encode(mime, data),
            ResolvedMedia::Linked { path, .. } => path.clone(),
        }
    }

    fn manifest(&self) -> MediaManifestEntry {
        match self {
            ResolvedMedia::Embedded { mime, data } => MediaManifestEntry {
                mime: mime.clone(),
                bytes: data.len() as u64,
                link: None,
            },
            ResolvedMedia::Linked { mime, path } => MediaManifestEntry {
                mime: mime.clone(),
                bytes: 0,
                link: Some(path.clone()),
            },
        }
    }
}

/// Assembles containers under a set of limits
#[derive(Debug, Clone, Default)]
pub struct ContainerBuilder {
    limits: BuildLimits,
}

impl ContainerBuilder {
    pub fn new(limits: BuildLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &BuildLimits {
        &self.limits
    }

    /// Build a container document.
    ///
    /// Fails rather than truncating: a missing required payload beyond the
    /// configured tolerance, an oversized embed or a payload whose MIME type
    /// does not match its slot all name the offending asset.
    #[instrument(skip(self, assets, metadata), fields(project = %id))]
    pub fn build(
        &self,
        id: &ProjectId,
        assets: &BuildAssets,
        metadata: &ProjectMetadata,
    ) -> Result<BuiltContainer, BuildError> {
        let mut resolved: Vec<(MediaKind, ResolvedMedia)> = Vec::new();
        let mut missing: Vec<MediaKind> = Vec::new();
        let mut embedded_bytes: u64 = 0;

        for kind in MediaKind::ALL {
            let media = match assets.get(kind) {
                Some(source) => resolve_asset(kind, source)?,
                None => None,
            };

            let Some(media) = media else {
                if self.limits.required_media.contains(&kind) {
                    missing.push(kind);
                }
                continue;
            };

            if let ResolvedMedia::Embedded { data, .. } = &media {
                embedded_bytes += datauri::base64_len(data.len());
                if embedded_bytes > self.limits.max_embedded_bytes {
                    return Err(BuildError::Oversized {
                        asset: asset_label(kind, assets.get(kind)),
                        size: embedded_bytes,
                        limit: self.limits.max_embedded_bytes,
                    });
                }
            }

            resolved.push((kind, media));
        }

        if missing.len() > self.limits.missing_media_tolerance {
            return Err(BuildError::MissingMedia { kind: missing[0] });
        }

        let mut meta = metadata.clone();
        meta.name = Some(id.to_string());
        meta.created_at = Some(meta.created_at.unwrap_or_else(Utc::now));
        meta.template.get_or_insert_with(|| DEFAULT_TEMPLATE.to_string());
        meta.format_version = Some(FORMAT_VERSION.to_string());
        meta.media = resolved
            .iter()
            .map(|(kind, media)| (*kind, media.manifest()))
            .collect();

        let document = render(&meta, &assets.source_text, &resolved)?;

        debug!(
            embedded_bytes,
            document_bytes = document.len(),
            media = resolved.len(),
            "Built container"
        );

        Ok(BuiltContainer {
            document,
            metadata: meta,
            embedded_bytes,
        })
    }

    /// Rewrite an existing container's metadata block with `update` merged in.
    ///
    /// Media payloads and layers are left byte-for-byte as they were.
    pub fn rebuild_with_metadata(
        &self,
        existing: &str,
        update: &ProjectMetadata,
    ) -> crate::error::Result<(String, ProjectMetadata)> {
        let mut meta = super::extract::extract_metadata(existing)?.unwrap_or_default();
        meta.merge(update);
        meta.modified_at = Some(Utc::now());
        meta.format_version = Some(FORMAT_VERSION.to_string());

        let document = super::extract::replace_metadata_block(existing, &meta)?;
        Ok((document, meta))
    }
}

/// Human-readable name for an asset in error messages
fn asset_label(kind: MediaKind, source: Option<&AssetSource>) -> String {
    let name = match source {
        Some(AssetSource::Bytes {
            file_name: Some(name),
            ..
        }) => Some(name.clone()),
        Some(AssetSource::File(path)) => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
        Some(AssetSource::Link(path)) => Some(path.clone()),
        _ => None,
    };

    match name {
        Some(name) => format!("{} ({})", kind, name),
        None => kind.to_string(),
    }
}

/// Load and type-check one asset. `Ok(None)` means the asset is absent.
fn resolve_asset(kind: MediaKind, source: &AssetSource) -> Result<Option<ResolvedMedia>, BuildError> {
    let label = || asset_label(kind, Some(source));

    let (mime, media) = match source {
        AssetSource::Bytes { data, file_name } => {
            if data.is_empty() {
                return Ok(None);
            }
            let mime = datauri::infer_mime(data, file_name.as_deref());
            (
                mime,
                ResolvedMedia::Embedded {
                    mime: mime.to_string(),
                    data: data.clone(),
                },
            )
        }
        AssetSource::File(path) => {
            let data = match std::fs::read(path) {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => {
                    return Err(BuildError::Unreadable {
                        asset: label(),
                        reason: e.kind().to_string(),
                    })
                }
            };
            if data.is_empty() {
                return Ok(None);
            }
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            let mime = datauri::infer_mime(&data, name.as_deref());
            (
                mime,
                ResolvedMedia::Embedded {
                    mime: mime.to_string(),
                    data,
                },
            )
        }
        AssetSource::Link(path) => {
            if !is_safe_relative(path) {
                return Err(BuildError::InvalidLink {
                    asset: label(),
                    path: path.clone(),
                });
            }
            let mime = datauri::mime_from_extension(path).unwrap_or(datauri::OCTET_STREAM);
            (
                mime,
                ResolvedMedia::Linked {
                    mime: mime.to_string(),
                    path: path.clone(),
                },
            )
        }
    };

    if !kind.accepts_mime(mime) {
        return Err(BuildError::MimeMismatch {
            asset: label(),
            mime: mime.to_string(),
            kind,
        });
    }

    Ok(Some(media))
}

/// A link must stay inside the project directory
pub(crate) fn is_safe_relative(path: &str) -> bool {
    let path = path.trim();
    if path.is_empty() || path.contains(':') || path.contains('\\') {
        return false;
    }
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn background_for_theme(theme: Option<&str>) -> &'static str {
    match theme {
        Some("light") => "#ffffff",
        Some("tech") => "#0b1d2a",
        Some("philosophy") => "#2c2c2c",
        _ => "#1a1a1a",
    }
}

/// Serialize the document. All interpolated text goes through `escape`.
fn render(
    meta: &ProjectMetadata,
    source_text: &str,
    media: &[(MediaKind, ResolvedMedia)],
) -> Result<String, BuildError> {
    let json = serde_json::to_string(meta).map_err(|e| BuildError::Encoding(e.to_string()))?;
    let title = meta.display_title().unwrap_or("Untitled project");
    let find = |kind: MediaKind| media.iter().find(|(k, _)| *k == kind).map(|(_, m)| m);

    // Writing into a String cannot fail
    let mut doc = String::with_capacity(json.len() + 4096);
    let _ = writeln!(doc, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        doc,
        r#"<svg xmlns="{SVG_NS}" xmlns:xlink="{XLINK_NS}" xmlns:ytb="{YTB_NS}" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
    );
    let _ = writeln!(doc, "  <title>{}</title>", escape(title));
    let _ = writeln!(doc, "  <desc>{}</desc>", escape(source_text));
    let _ = writeln!(doc, r#"  <metadata id="project-metadata">"#);
    let _ = writeln!(
        doc,
        r#"    <ytb:project type="application/json">{}</ytb:project>"#,
        escape(&json)
    );
    let _ = writeln!(doc, "  </metadata>");

    let _ = writeln!(doc, r#"  <g id="layer-background">"#);
    let _ = writeln!(
        doc,
        r#"    <rect width="100%" height="100%" fill="{}"/>"#,
        background_for_theme(meta.theme.as_deref())
    );
    let _ = writeln!(doc, "  </g>");

    let _ = writeln!(doc, r#"  <g id="layer-thumbnail">"#);
    if let Some(thumb) = find(MediaKind::Thumbnail) {
        let _ = writeln!(
            doc,
            r#"    <image id="{}" href="{}" x="0" y="0" width="{WIDTH}" height="{HEIGHT}" preserveAspectRatio="xMidYMid slice"/>"#,
            MediaKind::Thumbnail.element_id(),
            escape(&thumb.source_attr())
        );
    }
    let _ = writeln!(doc, "  </g>");

    let _ = writeln!(doc, r#"  <g id="layer-title">"#);
    let _ = writeln!(
        doc,
        r#"    <text x="50%" y="10%" text-anchor="middle" fill="white" font-size="{}" font-family="Arial, sans-serif">{}</text>"#,
        meta.font_size.unwrap_or(DEFAULT_TITLE_FONT_SIZE),
        escape(title)
    );
    let _ = writeln!(doc, "  </g>");

    let _ = writeln!(doc, r#"  <g id="layer-player" style="display:none">"#);
    let _ = writeln!(
        doc,
        r#"    <foreignObject x="0" y="0" width="{WIDTH}" height="{HEIGHT}">"#
    );
    for (kind, tag) in [(MediaKind::Video, "video"), (MediaKind::Audio, "audio")] {
        if let Some(item) = find(kind) {
            let _ = writeln!(
                doc,
                r#"      <{tag} xmlns="{XHTML_NS}" id="{}" src="{}" controls="controls"/>"#,
                kind.element_id(),
                escape(&item.source_attr())
            );
        }
    }
    let _ = writeln!(doc, "    </foreignObject>");
    let _ = writeln!(doc, "  </g>");
    doc.push_str("</svg>\n");

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::extract::{extract_media_sources, extract_metadata};
    use crate::domain::MediaSource;

    fn mp4_bytes() -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0x10];
        data.extend_from_slice(b"ftypisom\0\0\0\0");
        data
    }

    fn wav_bytes() -> Vec<u8> {
        let mut data = b"RIFF\x24\0\0\0WAVE".to_vec();
        data.extend_from_slice(&[0u8; 32]);
        data
    }

    fn demo_id() -> ProjectId {
        ProjectId::parse("demo").unwrap()
    }

    #[test]
    fn test_build_embeds_media_and_metadata() {
        let builder = ContainerBuilder::default();
        let assets = BuildAssets::new("Hello & <world>")
            .with_video(AssetSource::named_bytes(mp4_bytes(), "demo.mp4"))
            .with_audio(AssetSource::bytes(wav_bytes()));
        let meta = ProjectMetadata::titled("A \"quoted\" title").with_tag("rust");

        let built = builder.build(&demo_id(), &assets, &meta).unwrap();

        assert!(built.document.contains("data:video/mp4;base64,"));
        assert!(built.document.contains("data:audio/wav;base64,"));
        assert!(built.document.contains("<desc>Hello &amp; &lt;world&gt;</desc>"));
        assert!(!built.document.contains("\"quoted\""));
        assert_eq!(built.metadata.name.as_deref(), Some("demo"));
        assert_eq!(built.metadata.template.as_deref(), Some("classic"));
        assert_eq!(built.metadata.media.len(), 2);

        let extracted = extract_metadata(&built.document).unwrap().unwrap();
        assert_eq!(extracted, built.metadata);

        let sources = extract_media_sources(&built.document);
        assert!(sources[&MediaKind::Video].is_embedded());
        assert!(!sources.contains_key(&MediaKind::Thumbnail));
    }

    #[test]
    fn test_build_fails_on_missing_required_media() {
        let builder = ContainerBuilder::default();
        let assets = BuildAssets::new("text").with_video(AssetSource::bytes(mp4_bytes()));

        let err = builder
            .build(&demo_id(), &assets, &ProjectMetadata::default())
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::MissingMedia {
                kind: MediaKind::Audio
            }
        ));
    }

    #[test]
    fn test_missing_media_within_tolerance() {
        let builder = ContainerBuilder::new(BuildLimits {
            missing_media_tolerance: 1,
            ..BuildLimits::default()
        });
        let assets = BuildAssets::new("text").with_video(AssetSource::bytes(mp4_bytes()));

        let built = builder
            .build(&demo_id(), &assets, &ProjectMetadata::default())
            .unwrap();
        assert!(!built.metadata.media.contains_key(&MediaKind::Audio));
    }

    #[test]
    fn test_missing_file_counts_as_missing() {
        let builder = ContainerBuilder::default();
        let assets = BuildAssets::new("text")
            .with_video(AssetSource::bytes(mp4_bytes()))
            .with_audio(AssetSource::File(PathBuf::from("/nonexistent/voice.mp3")));

        let err = builder
            .build(&demo_id(), &assets, &ProjectMetadata::default())
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingMedia { .. }));
    }

    #[test]
    fn test_oversized_names_the_asset() {
        let builder = ContainerBuilder::new(BuildLimits {
            max_embedded_bytes: 64,
            ..BuildLimits::default()
        });
        let mut big = mp4_bytes();
        big.resize(200, 0);
        let assets = BuildAssets::new("text")
            .with_video(AssetSource::named_bytes(big, "long-cut.mp4"))
            .with_audio(AssetSource::bytes(wav_bytes()));

        match builder.build(&demo_id(), &assets, &ProjectMetadata::default()) {
            Err(BuildError::Oversized { asset, limit, .. }) => {
                assert!(asset.contains("long-cut.mp4"));
                assert_eq!(limit, 64);
            }
            other => panic!("Expected Oversized, got {other:?}"),
        }
    }

    #[test]
    fn test_mime_mismatch_is_rejected() {
        let builder = ContainerBuilder::default();
        let assets = BuildAssets::new("text")
            .with_video(AssetSource::bytes(wav_bytes()))
            .with_audio(AssetSource::bytes(wav_bytes()));

        let err = builder
            .build(&demo_id(), &assets, &ProjectMetadata::default())
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::MimeMismatch {
                kind: MediaKind::Video,
                ..
            }
        ));
    }

    #[test]
    fn test_linked_media() {
        let builder = ContainerBuilder::default();
        let assets = BuildAssets::new("text")
            .with_video(AssetSource::Link("demo.mp4".to_string()))
            .with_audio(AssetSource::Link("./demo.mp3".to_string()));

        let built = builder
            .build(&demo_id(), &assets, &ProjectMetadata::default())
            .unwrap();
        assert_eq!(built.embedded_bytes, 0);
        assert_eq!(
            extract_media_sources(&built.document)[&MediaKind::Video],
            MediaSource::Relative("demo.mp4".to_string())
        );
        assert_eq!(
            built.metadata.media[&MediaKind::Video].link.as_deref(),
            Some("demo.mp4")
        );

        let bad = BuildAssets::new("text").with_video(AssetSource::Link("../other/x.mp4".to_string()));
        assert!(matches!(
            builder.build(&demo_id(), &bad, &ProjectMetadata::default()),
            Err(BuildError::InvalidLink { .. })
        ));
    }

    #[test]
    fn test_safe_relative_paths() {
        assert!(is_safe_relative("a.mp4"));
        assert!(is_safe_relative("media/a.mp4"));
        assert!(!is_safe_relative("/abs/a.mp4"));
        assert!(!is_safe_relative("../a.mp4"));
        assert!(!is_safe_relative("https://cdn/a.mp4"));
        assert!(!is_safe_relative(""));
    }

    #[test]
    fn test_rebuild_with_metadata_keeps_media() {
        let builder = ContainerBuilder::default();
        let assets = BuildAssets::new("text")
            .with_video(AssetSource::bytes(mp4_bytes()))
            .with_audio(AssetSource::bytes(wav_bytes()));
        let built = builder
            .build(&demo_id(), &assets, &ProjectMetadata::titled("First"))
            .unwrap();

        let (doc, meta) = builder
            .rebuild_with_metadata(&built.document, &ProjectMetadata::titled("Second"))
            .unwrap();

        assert_eq!(meta.title.as_deref(), Some("Second"));
        assert!(meta.modified_at.is_some());
        assert_eq!(meta.created_at, built.metadata.created_at);
        assert_eq!(extract_metadata(&doc).unwrap().unwrap(), meta);
        assert_eq!(
            extract_media_sources(&doc),
            extract_media_sources(&built.document)
        );
    }
}
