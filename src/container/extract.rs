//! Read blocks back out of a container document.
//!
//! Extraction is plain text scanning so it works whichever validation
//! backend is compiled in, and so that it can read the older
//! `<script type="application/json">` form of the metadata block.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::escape::{escape, unescape};
use crate::domain::{MediaKind, MediaSource, ProjectMetadata};
use crate::error::{BundleError, Result};

const PROJECT_OPEN: &str = "<ytb:project";
const PROJECT_CLOSE: &str = "</ytb:project>";
const SCRIPT_OPEN: &str = "<script";
const SCRIPT_CLOSE: &str = "</script>";

fn media_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<(?:image|video|audio|source)\b[^>]*>").expect("static regex is valid")
    })
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_:][A-Za-z0-9_.:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("static regex is valid")
    })
}

/// Byte range of a metadata block's JSON text within the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockSpan {
    start: usize,
    end: usize,
}

/// Locate the JSON text of the metadata block.
///
/// The `<ytb:project>` element wins; a JSON `<script>` inside `<metadata>`
/// is accepted as the older form.
fn find_metadata_block(doc: &str) -> Option<BlockSpan> {
    let meta_start = doc.find("<metadata")?;
    let meta_end = doc[meta_start..]
        .find("</metadata>")
        .map(|i| meta_start + i)
        .unwrap_or(doc.len());
    let region = &doc[meta_start..meta_end];

    for (open, close) in [(PROJECT_OPEN, PROJECT_CLOSE), (SCRIPT_OPEN, SCRIPT_CLOSE)] {
        let Some(tag_start) = region.find(open) else {
            continue;
        };
        let Some(tag_len) = region[tag_start..].find('>') else {
            continue;
        };
        let content_start = tag_start + tag_len + 1;
        let Some(content_len) = region[content_start..].find(close) else {
            continue;
        };
        return Some(BlockSpan {
            start: meta_start + content_start,
            end: meta_start + content_start + content_len,
        });
    }

    None
}

/// Raw JSON value of the metadata block, if present.
///
/// A block that is present but not valid JSON is an error, not `None`.
pub fn extract_metadata_value(doc: &str) -> Result<Option<Value>> {
    let Some(span) = find_metadata_block(doc) else {
        return Ok(None);
    };

    let text = unescape(doc[span.start..span.end].trim());
    if text.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| BundleError::Metadata(e.to_string()))
}

/// Structured metadata from the container's metadata block
pub fn extract_metadata(doc: &str) -> Result<Option<ProjectMetadata>> {
    Ok(extract_metadata_value(doc)?.map(|value| ProjectMetadata::from_loose_value(&value)))
}

/// Replace the metadata block (and `<title>`) with `meta`, leaving the
/// rest of the document untouched
pub fn replace_metadata_block(doc: &str, meta: &ProjectMetadata) -> Result<String> {
    let span = find_metadata_block(doc)
        .ok_or_else(|| BundleError::Metadata("container has no metadata block".to_string()))?;
    let json = serde_json::to_string(meta).map_err(|e| BundleError::Metadata(e.to_string()))?;

    let mut out = String::with_capacity(doc.len() + json.len());
    out.push_str(&doc[..span.start]);
    out.push_str(&escape(&json));
    out.push_str(&doc[span.end..]);

    match meta.display_title() {
        Some(title) => Ok(replace_element_text(&out, "title", &escape(title))),
        None => Ok(out),
    }
}

/// Text content of the first `<tag>` element, unescaped
fn element_text(doc: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let mut search = 0;
    while let Some(rel) = doc[search..].find(&open) {
        let start = search + rel;
        let after = start + open.len();
        // `<title` must not match `<titles`
        match doc[after..].chars().next() {
            Some('>') | Some(' ') | Some('\t') | Some('\n') | Some('\r') => {}
            _ => {
                search = after;
                continue;
            }
        }
        let content_start = after + doc[after..].find('>')? + 1;
        if doc[..content_start].ends_with("/>") {
            return Some(String::new());
        }
        let content_end = content_start + doc[content_start..].find(&close)?;
        return Some(unescape(&doc[content_start..content_end]).into_owned());
    }
    None
}

fn replace_element_text(doc: &str, tag: &str, escaped_text: &str) -> String {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let Some(start) = doc.find(&open) else {
        return doc.to_string();
    };
    let content_start = start + open.len();
    let Some(len) = doc[content_start..].find(&close) else {
        return doc.to_string();
    };

    let mut out = String::with_capacity(doc.len());
    out.push_str(&doc[..content_start]);
    out.push_str(escaped_text);
    out.push_str(&doc[content_start + len..]);
    out
}

/// The source text stored in `<desc>`
pub fn extract_description(doc: &str) -> Option<String> {
    element_text(doc, "desc")
}

/// The document `<title>`
pub fn extract_title(doc: &str) -> Option<String> {
    element_text(doc, "title")
}

/// Media sources by kind.
///
/// Elements identified by their `id` attribute come first; containers written
/// by older tools kept data URIs in the metadata block's `media` map under
/// keys like `video_mp4`, which fill any kind still missing.
pub fn extract_media_sources(doc: &str) -> BTreeMap<MediaKind, MediaSource> {
    let mut sources = BTreeMap::new();

    for tag in media_tag_regex().find_iter(doc) {
        let mut id = None;
        let mut src = None;
        for caps in attr_regex().captures_iter(tag.as_str()) {
            let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
            match &caps[1] {
                "id" => id = value,
                "src" | "href" | "xlink:href" => src = src.or(value),
                _ => {}
            }
        }

        let (Some(id), Some(src)) = (id, src) else {
            continue;
        };
        if let Some(kind) = MediaKind::from_element_id(id) {
            sources
                .entry(kind)
                .or_insert_with(|| MediaSource::from_attribute(&unescape(src)));
        }
    }

    if sources.len() < MediaKind::ALL.len() {
        if let Ok(Some(value)) = extract_metadata_value(doc) {
            fill_from_legacy_media(&value, &mut sources);
        }
    }

    sources
}

fn fill_from_legacy_media(value: &Value, sources: &mut BTreeMap<MediaKind, MediaSource>) {
    let Some(media) = value.get("media").and_then(Value::as_object) else {
        return;
    };

    for (key, entry) in media {
        let Some(uri) = entry.as_str() else {
            continue;
        };
        let prefix = key.split(['_', '.']).next().unwrap_or(key);
        if let Ok(kind) = prefix.parse::<MediaKind>() {
            sources
                .entry(kind)
                .or_insert_with(|| MediaSource::from_attribute(uri));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="1280" height="720">
  <title>Old one</title>
  <desc>Line one &amp; two</desc>
  <metadata>
    <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
      <rdf:Description>
        <script type="application/json">{"title": "Old one", "theme": "tech", "lang": "pl", "media": {"video_mp4": "data:video/mp4;base64,AAAA", "audio_mp3": "data:audio/mpeg;base64,BBBB"}}</script>
      </rdf:Description>
    </rdf:RDF>
  </metadata>
  <image id="thumb" href="data:image/jpeg;base64,CCCC" x="0" y="0"/>
</svg>"#;

    #[test]
    fn test_reads_legacy_script_block() {
        let meta = extract_metadata(LEGACY).unwrap().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Old one"));
        assert_eq!(meta.theme.as_deref(), Some("tech"));
        assert_eq!(meta.language.as_deref(), Some("pl"));

        assert_eq!(extract_description(LEGACY).as_deref(), Some("Line one & two"));
        assert_eq!(extract_title(LEGACY).as_deref(), Some("Old one"));
    }

    #[test]
    fn test_legacy_media_map_fills_sources() {
        let sources = extract_media_sources(LEGACY);
        assert_eq!(sources.len(), 3);
        assert_eq!(
            sources[&MediaKind::Video],
            MediaSource::DataUri("data:video/mp4;base64,AAAA".to_string())
        );
        assert_eq!(
            sources[&MediaKind::Thumbnail],
            MediaSource::DataUri("data:image/jpeg;base64,CCCC".to_string())
        );
    }

    #[test]
    fn test_no_metadata_block() {
        let doc = r#"<svg xmlns="http://www.w3.org/2000/svg"><desc>x</desc></svg>"#;
        assert!(extract_metadata(doc).unwrap().is_none());
        assert!(extract_media_sources(doc).is_empty());
    }

    #[test]
    fn test_corrupt_block_is_an_error() {
        let doc = r#"<svg><metadata id="project-metadata"><ytb:project type="application/json">{"title": </ytb:project></metadata></svg>"#;
        assert!(matches!(extract_metadata(doc), Err(BundleError::Metadata(_))));
    }

    #[test]
    fn test_replace_block_updates_title() {
        let doc = r#"<svg><title>Old</title><metadata id="project-metadata"><ytb:project type="application/json">{"title":"Old"}</ytb:project></metadata><video id="media-video" src="a.mp4"/></svg>"#;
        let meta = ProjectMetadata::titled("New <one>");

        let out = replace_metadata_block(doc, &meta).unwrap();
        assert!(out.contains("<title>New &lt;one&gt;</title>"));
        assert_eq!(extract_metadata(&out).unwrap().unwrap().title.as_deref(), Some("New <one>"));
        assert!(out.ends_with(r#"<video id="media-video" src="a.mp4"/></svg>"#));
    }

    #[test]
    fn test_element_text_skips_prefix_matches() {
        let doc = "<svg><descx>no</descx><desc>yes</desc></svg>";
        assert_eq!(extract_description(doc).as_deref(), Some("yes"));
    }
}
