//! Media Integrity Checker.
//!
//! Structural validity says nothing about whether the embedded payloads play.
//! [`MediaChecker::check`] resolves each payload (data URI or sibling file),
//! runs a decode probe and reports duration, audio presence and silence.
//! [`MediaReport::ensure_playable`] is the gate consumers call before
//! starting playback.

pub mod probe;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub use probe::{DefaultProbe, MediaProbe, ProbeMethod, ProbeReport};

use crate::config::MediaSettings;
use crate::container::builder::is_safe_relative;
use crate::container::datauri::{self, DataUri};
use crate::container::extract::extract_media_sources;
use crate::domain::{MediaKind, MediaSource, ProjectId};
use crate::error::{BundleError, Result};
use crate::store::Layout;

/// Where a payload was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadOrigin {
    Embedded,
    Linked,
    /// Sibling file of a legacy multi-file project
    Sibling,
}

/// Integrity of one media kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaCheckResult {
    pub kind: MediaKind,
    pub exists: bool,
    pub decodable: bool,
    pub duration_seconds: Option<f64>,
    pub has_audio_track: bool,
    pub is_silent: bool,

    /// Mean level in dBFS; absent for digital silence or no samples
    pub mean_volume_db: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<PayloadOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Why the payload is missing or undecodable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MediaCheckResult {
    fn missing(kind: MediaKind) -> Self {
        Self {
            kind,
            exists: false,
            decodable: false,
            duration_seconds: None,
            has_audio_track: false,
            // Nothing to hear from what is not there
            is_silent: kind != MediaKind::Thumbnail,
            mean_volume_db: None,
            mime: None,
            origin: None,
            probe: None,
            width: None,
            height: None,
            error: None,
        }
    }

    fn undecodable(kind: MediaKind, mime: String, origin: PayloadOrigin, reason: String) -> Self {
        Self {
            exists: true,
            mime: Some(mime),
            origin: Some(origin),
            error: Some(reason),
            ..Self::missing(kind)
        }
    }

    /// True when the payload carries an audible signal
    pub fn is_audible(&self) -> bool {
        self.decodable && self.has_audio_track && !self.is_silent
    }
}

/// Integrity of every media kind of one project
#[derive(Debug, Clone, Serialize)]
pub struct MediaReport {
    pub project: String,
    pub silence_threshold_db: f64,
    pub results: BTreeMap<MediaKind, MediaCheckResult>,
}

impl MediaReport {
    pub fn get(&self, kind: MediaKind) -> Option<&MediaCheckResult> {
        self.results.get(&kind)
    }

    /// Playback precondition: a decodable video, and audible signal either
    /// in the video's own sound track or in the audio asset
    pub fn ensure_playable(&self) -> Result<()> {
        let video = self.get(MediaKind::Video);
        match video {
            Some(v) if v.decodable => {}
            Some(v) if v.exists => {
                return Err(BundleError::MediaProbe {
                    kind: MediaKind::Video,
                    reason: v
                        .error
                        .clone()
                        .unwrap_or_else(|| "payload is not decodable".to_string()),
                })
            }
            _ => {
                return Err(BundleError::MediaProbe {
                    kind: MediaKind::Video,
                    reason: "no video payload".to_string(),
                })
            }
        }

        let audible = video.is_some_and(MediaCheckResult::is_audible)
            || self
                .get(MediaKind::Audio)
                .is_some_and(MediaCheckResult::is_audible);
        if !audible {
            let reason = match self.get(MediaKind::Audio) {
                Some(a) if a.exists && !a.decodable => a
                    .error
                    .clone()
                    .unwrap_or_else(|| "payload is not decodable".to_string()),
                Some(a) if a.exists => format!(
                    "audio is silent (below {} dB)",
                    self.silence_threshold_db
                ),
                _ => "no audible audio in video or audio payload".to_string(),
            };
            return Err(BundleError::MediaProbe {
                kind: MediaKind::Audio,
                reason,
            });
        }

        Ok(())
    }
}

/// A payload as located on disk or in the container, not yet probed
enum Located {
    Bytes {
        mime: String,
        data: Vec<u8>,
        origin: PayloadOrigin,
    },
    Broken {
        mime: String,
        origin: PayloadOrigin,
        reason: String,
    },
    Absent,
}

/// Probes the media of registry projects
#[derive(Clone)]
pub struct MediaChecker {
    layout: Layout,
    probe: Arc<dyn MediaProbe>,
    silence_threshold_db: f64,
}

impl std::fmt::Debug for MediaChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaChecker")
            .field("layout", &self.layout)
            .field("silence_threshold_db", &self.silence_threshold_db)
            .finish()
    }
}

impl MediaChecker {
    pub fn new(layout: Layout, settings: &MediaSettings) -> Self {
        Self::with_probe(layout, settings, Arc::new(DefaultProbe))
    }

    pub fn with_probe(layout: Layout, settings: &MediaSettings, probe: Arc<dyn MediaProbe>) -> Self {
        Self {
            layout,
            probe,
            silence_threshold_db: settings.silence_threshold_db,
        }
    }

    pub fn silence_threshold_db(&self) -> f64 {
        self.silence_threshold_db
    }

    /// Probe every media kind of a project
    #[instrument(skip(self), fields(project = %id))]
    pub async fn check(&self, id: &ProjectId) -> Result<MediaReport> {
        if !fs::try_exists(self.layout.project_dir(id)).await? {
            return Err(BundleError::ProjectNotFound(id.to_string()));
        }

        let located = self.locate(id).await?;
        let probe = Arc::clone(&self.probe);
        let threshold = self.silence_threshold_db;

        // Decoding is seconds-scale; keep it off the async workers
        let results = tokio::task::spawn_blocking(move || {
            located
                .into_iter()
                .map(|(kind, found)| (kind, probe_one(probe.as_ref(), kind, found, threshold)))
                .collect::<BTreeMap<_, _>>()
        })
        .await
        .map_err(std::io::Error::other)?;

        for result in results.values() {
            if let Some(error) = &result.error {
                warn!(kind = %result.kind, %error, "Media payload failed probe");
            }
        }
        info!(
            video = results.get(&MediaKind::Video).is_some_and(|r| r.decodable),
            audible = results.values().any(MediaCheckResult::is_audible),
            "Media check complete"
        );

        Ok(MediaReport {
            project: id.to_string(),
            silence_threshold_db: threshold,
            results,
        })
    }

    /// Resolve every media kind to bytes, a broken reference, or nothing
    async fn locate(&self, id: &ProjectId) -> Result<BTreeMap<MediaKind, Located>> {
        let mut located = BTreeMap::new();

        let container = match fs::read_to_string(self.layout.container_path(id)).await {
            Ok(doc) => Some(doc),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        match container {
            Some(doc) => {
                let sources = extract_media_sources(&doc);
                for kind in MediaKind::ALL {
                    let found = match sources.get(&kind) {
                        Some(source) => self.resolve_source(id, source).await,
                        None => Located::Absent,
                    };
                    located.insert(kind, found);
                }
            }
            None => {
                let siblings = legacy_media_files(&self.layout, id);
                for kind in MediaKind::ALL {
                    let found = match siblings.get(&kind) {
                        Some(path) => read_file(path, PayloadOrigin::Sibling).await,
                        None => Located::Absent,
                    };
                    located.insert(kind, found);
                }
            }
        }

        Ok(located)
    }

    async fn resolve_source(&self, id: &ProjectId, source: &MediaSource) -> Located {
        match source {
            MediaSource::DataUri(uri) => match DataUri::parse(uri) {
                Ok(parsed) => match parsed.decode() {
                    Ok(data) => Located::Bytes {
                        mime: parsed.mime.to_string(),
                        data,
                        origin: PayloadOrigin::Embedded,
                    },
                    Err(e) => Located::Broken {
                        mime: parsed.mime.to_string(),
                        origin: PayloadOrigin::Embedded,
                        reason: format!("base64 payload is corrupt: {e}"),
                    },
                },
                Err(reason) => Located::Broken {
                    mime: datauri::OCTET_STREAM.to_string(),
                    origin: PayloadOrigin::Embedded,
                    reason,
                },
            },
            MediaSource::Relative(path) => {
                if !is_safe_relative(path) {
                    return Located::Broken {
                        mime: datauri::mime_from_extension(path)
                            .unwrap_or(datauri::OCTET_STREAM)
                            .to_string(),
                        origin: PayloadOrigin::Linked,
                        reason: "link points outside the project directory".to_string(),
                    };
                }
                read_file(&self.layout.sibling_path(id, path), PayloadOrigin::Linked).await
            }
        }
    }
}

async fn read_file(path: &std::path::Path, origin: PayloadOrigin) -> Located {
    match fs::read(path).await {
        Ok(data) => {
            let name = path.file_name().and_then(|n| n.to_str());
            Located::Bytes {
                mime: datauri::infer_mime(&data, name).to_string(),
                data,
                origin,
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Linked media file is missing");
            Located::Absent
        }
        Err(e) => Located::Broken {
            mime: datauri::OCTET_STREAM.to_string(),
            origin,
            reason: format!("file could not be read: {}", e.kind()),
        },
    }
}

fn probe_one(probe: &dyn MediaProbe, kind: MediaKind, found: Located, threshold: f64) -> MediaCheckResult {
    let (mime, data, origin) = match found {
        Located::Absent => return MediaCheckResult::missing(kind),
        Located::Broken {
            mime,
            origin,
            reason,
        } => return MediaCheckResult::undecodable(kind, mime, origin, reason),
        Located::Bytes { mime, data, origin } => (mime, data, origin),
    };

    match probe.probe(kind, &mime, &data) {
        Ok(report) => {
            let is_silent = match kind {
                MediaKind::Thumbnail => false,
                _ => is_silent(&report, threshold),
            };
            MediaCheckResult {
                kind,
                exists: true,
                decodable: true,
                duration_seconds: report.duration_seconds,
                has_audio_track: report.has_audio_track,
                is_silent,
                mean_volume_db: report.mean_volume_db.filter(|db| db.is_finite()),
                mime: Some(mime),
                origin: Some(origin),
                probe: report.method,
                width: report.width,
                height: report.height,
                error: None,
            }
        }
        Err(reason) => MediaCheckResult::undecodable(kind, mime, origin, reason),
    }
}

/// Silent when there is no sound track, no measurement, or the mean level
/// is below `threshold` (digital silence is `-inf`)
pub fn is_silent(report: &ProbeReport, threshold: f64) -> bool {
    if !report.has_audio_track {
        return true;
    }
    match report.mean_volume_db {
        Some(db) => db.is_nan() || db < threshold,
        None => true,
    }
}

const LEGACY_VIDEO_EXTS: [&str; 3] = ["mp4", "webm", "mov"];
const LEGACY_AUDIO_EXTS: [&str; 4] = ["mp3", "wav", "ogg", "m4a"];
const LEGACY_THUMB_EXTS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Sibling media of a legacy multi-file project.
///
/// Video and audio are `<id>.<ext>`; the thumbnail is `thumbnail.<ext>`.
pub fn legacy_media_files(layout: &Layout, id: &ProjectId) -> BTreeMap<MediaKind, PathBuf> {
    let dir = layout.project_dir(id);
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let stem = glob::Pattern::escape(id.as_str());

    let mut found = BTreeMap::new();
    let searches: [(MediaKind, String, &[&str]); 3] = [
        (MediaKind::Video, format!("{}/{}.*", base, stem), &LEGACY_VIDEO_EXTS),
        (MediaKind::Audio, format!("{}/{}.*", base, stem), &LEGACY_AUDIO_EXTS),
        (MediaKind::Thumbnail, format!("{}/thumbnail.*", base), &LEGACY_THUMB_EXTS),
    ];

    for (kind, pattern, exts) in searches {
        let Ok(paths) = glob::glob(&pattern) else {
            continue;
        };
        let mut candidates: Vec<PathBuf> = paths
            .flatten()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| exts.contains(&e.to_ascii_lowercase().as_str()))
            })
            .collect();
        // Preference follows the extension list order
        candidates.sort_by_key(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .and_then(|e| exts.iter().position(|x| x.eq_ignore_ascii_case(e)))
                .unwrap_or(usize::MAX)
        });
        if let Some(path) = candidates.into_iter().next() {
            found.insert(kind, path);
        }
    }

    found
}
