//! Lightweight decode probes.
//!
//! - audio: Symphonia decode, duration and mean RMS level in dBFS
//! - MP4/QuickTime video: ISO-BMFF box walk (`mvhd` duration, `hdlr` sound
//!   track), then Symphonia on the sound track if there is one
//! - other video containers: Symphonia track probe
//! - thumbnails: image header decode for dimensions

use std::io::Cursor;

use serde::Serialize;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::container::datauri::extension_for_mime;
use crate::domain::MediaKind;

/// Stop decoding after this much audio; the level estimate is stable by then
const MAX_DECODE_SECONDS: u64 = 600;

/// How a payload was probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMethod {
    Symphonia,
    IsoBmff,
    Image,
}

/// What a probe learned about one payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbeReport {
    pub method: Option<ProbeMethod>,
    pub duration_seconds: Option<f64>,
    pub has_audio_track: bool,

    /// Mean RMS level in dBFS; `-inf` for digital silence, `None` when no
    /// samples were decoded
    pub mean_volume_db: Option<f64>,

    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Decode probe for one media payload
pub trait MediaProbe: Send + Sync {
    /// Probe `data` as `kind`. An `Err` means the payload is undecodable.
    fn probe(&self, kind: MediaKind, mime: &str, data: &[u8]) -> Result<ProbeReport, String>;
}

/// Probe backed by Symphonia, the image crate and an ISO-BMFF reader
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProbe;

impl MediaProbe for DefaultProbe {
    fn probe(&self, kind: MediaKind, mime: &str, data: &[u8]) -> Result<ProbeReport, String> {
        if data.is_empty() {
            return Err("payload is empty".to_string());
        }

        match kind {
            MediaKind::Audio => probe_audio(mime, data),
            MediaKind::Video => probe_video(mime, data),
            MediaKind::Thumbnail => probe_image(data),
        }
    }
}

fn probe_audio(mime: &str, data: &[u8]) -> Result<ProbeReport, String> {
    let level = decode_level(mime, data)?;
    Ok(ProbeReport {
        method: Some(ProbeMethod::Symphonia),
        duration_seconds: level.duration_seconds,
        has_audio_track: true,
        mean_volume_db: level.mean_volume_db,
        ..Default::default()
    })
}

fn probe_video(mime: &str, data: &[u8]) -> Result<ProbeReport, String> {
    if !matches!(mime, "video/mp4" | "video/quicktime") {
        return probe_video_generic(mime, data);
    }

    let movie = read_movie_header(data)?;
    let mut report = ProbeReport {
        method: Some(ProbeMethod::IsoBmff),
        duration_seconds: movie.duration_seconds,
        has_audio_track: movie.has_sound_track,
        ..Default::default()
    };

    if movie.has_sound_track {
        match decode_level(mime, data) {
            Ok(level) => report.mean_volume_db = level.mean_volume_db,
            Err(reason) => warn!(%reason, "Sound track present but not decodable"),
        }
    }

    Ok(report)
}

/// Symphonia-only probe for WebM and friends
fn probe_video_generic(mime: &str, data: &[u8]) -> Result<ProbeReport, String> {
    match decode_level(mime, data) {
        Ok(level) => Ok(ProbeReport {
            method: Some(ProbeMethod::Symphonia),
            duration_seconds: level.duration_seconds,
            has_audio_track: true,
            mean_volume_db: level.mean_volume_db,
            ..Default::default()
        }),
        Err(reason) if reason == NO_AUDIO_TRACK => Ok(ProbeReport {
            method: Some(ProbeMethod::Symphonia),
            ..Default::default()
        }),
        Err(reason) => Err(reason),
    }
}

fn probe_image(data: &[u8]) -> Result<ProbeReport, String> {
    let (width, height) = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .into_dimensions()
        .map_err(|e| e.to_string())?;

    Ok(ProbeReport {
        method: Some(ProbeMethod::Image),
        width: Some(width),
        height: Some(height),
        ..Default::default()
    })
}

const NO_AUDIO_TRACK: &str = "no audio track";

#[derive(Debug, Clone, Copy, PartialEq)]
struct AudioLevel {
    duration_seconds: Option<f64>,
    mean_volume_db: Option<f64>,
}

/// Decode the first audio track and measure its mean level
fn decode_level(mime: &str, data: &[u8]) -> Result<AudioLevel, String> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());

    let mut hint = Hint::new();
    hint.mime_type(mime);
    if let Some(ext) = extension_for_mime(mime) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("unsupported format: {e}"))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or_else(|| NO_AUDIO_TRACK.to_string())?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let sample_rate = params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| format!("codec init failed: {e}"))?;

    let frame_limit = u64::from(sample_rate) * MAX_DECODE_SECONDS;
    let mut frames: u64 = 0;
    let mut sum_squares = 0f64;
    let mut samples: u64 = 0;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) if frames > 0 => {
                warn!(error = %e, "Stopping probe at unreadable packet");
                break;
            }
            Err(e) => return Err(format!("read failed: {e}")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!(error = %msg, "Skipping corrupted packet");
                continue;
            }
            Err(e) => return Err(format!("decode failed: {e}")),
        };

        let spec = *decoded.spec();
        let count = decoded.frames();
        if count == 0 {
            continue;
        }

        let mut buffer = SampleBuffer::<f32>::new(count as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        for &s in buffer.samples() {
            sum_squares += f64::from(s) * f64::from(s);
        }
        samples += buffer.samples().len() as u64;
        frames += count as u64;

        if frame_limit > 0 && frames >= frame_limit {
            break;
        }
    }

    if frames == 0 {
        return Err("no decodable audio frames".to_string());
    }

    let duration_seconds = match (params.n_frames, sample_rate) {
        (_, 0) => None,
        (Some(n), rate) => Some(n as f64 / f64::from(rate)),
        (None, rate) => Some(frames as f64 / f64::from(rate)),
    };

    Ok(AudioLevel {
        duration_seconds,
        mean_volume_db: Some(rms_to_db(sum_squares, samples)),
    })
}

/// Mean RMS level in dBFS (`-inf` for all-zero input)
pub(crate) fn rms_to_db(sum_squares: f64, samples: u64) -> f64 {
    if samples == 0 {
        return f64::NEG_INFINITY;
    }
    let rms = (sum_squares / samples as f64).sqrt();
    20.0 * rms.log10()
}

/// Facts read from an ISO-BMFF movie box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct MovieHeader {
    duration_seconds: Option<f64>,
    has_sound_track: bool,
}

const CONTAINER_BOXES: [&[u8; 4]; 6] = [b"moov", b"trak", b"mdia", b"minf", b"edts", b"udta"];

/// Walk the box tree for `mvhd` and sound `hdlr` boxes
fn read_movie_header(data: &[u8]) -> Result<MovieHeader, String> {
    if data.len() < 8 || &data[4..8] != b"ftyp" {
        return Err("not an ISO-BMFF file (no ftyp box)".to_string());
    }

    let mut header = MovieHeader::default();
    let mut found_mvhd = false;
    walk_boxes(data, 0, &mut |kind, body| match kind {
        b"mvhd" => {
            found_mvhd = true;
            header.duration_seconds = parse_mvhd(body);
        }
        b"hdlr" => {
            if body.len() >= 12 && &body[8..12] == b"soun" {
                header.has_sound_track = true;
            }
        }
        _ => {}
    })?;

    if !found_mvhd {
        return Err("movie header (mvhd) not found".to_string());
    }
    Ok(header)
}

fn walk_boxes(
    data: &[u8],
    depth: usize,
    visit: &mut dyn FnMut(&[u8; 4], &[u8]),
) -> Result<(), String> {
    if depth > 8 {
        return Err("box nesting too deep".to_string());
    }

    let mut pos = 0usize;
    while pos + 8 <= data.len() {
        let size32 = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        let kind: [u8; 4] = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];

        let (header_len, size) = match size32 {
            0 => (8usize, (data.len() - pos) as u64),
            1 => {
                let Some(raw) = data.get(pos + 8..pos + 16) else {
                    return Err("truncated 64-bit box header".to_string());
                };
                let mut large = [0u8; 8];
                large.copy_from_slice(raw);
                (16usize, u64::from_be_bytes(large))
            }
            n => (8usize, u64::from(n)),
        };

        let size = usize::try_from(size).map_err(|_| "box too large".to_string())?;
        if size < header_len || pos + size > data.len() {
            return Err(format!(
                "box {} at byte {} overruns the payload",
                String::from_utf8_lossy(&kind),
                pos
            ));
        }

        let body = &data[pos + header_len..pos + size];
        visit(&kind, body);
        if CONTAINER_BOXES.contains(&&kind) {
            walk_boxes(body, depth + 1, visit)?;
        }

        pos += size;
    }

    Ok(())
}

fn parse_mvhd(body: &[u8]) -> Option<f64> {
    let be32 = |at: usize| -> Option<u64> {
        let raw = body.get(at..at + 4)?;
        Some(u64::from(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])))
    };
    let be64 = |at: usize| -> Option<u64> {
        let raw = body.get(at..at + 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Some(u64::from_be_bytes(buf))
    };

    let (timescale, duration) = match body.first()? {
        // version 1: 64-bit creation/modification/duration
        1 => (be32(20)?, be64(24)?),
        _ => (be32(12)?, be32(16)?),
    };

    if timescale == 0 {
        return None;
    }
    Some(duration as f64 / timescale as f64)
}
