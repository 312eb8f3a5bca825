//! `data:<mime>;base64,<payload>` URIs and MIME inference.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Fallback when neither content nor extension identify a payload
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A parsed (still encoded) data URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime: &'a str,
    payload: &'a str,
}

impl<'a> DataUri<'a> {
    /// Parse a base64 data URI. Non-base64 URIs are rejected.
    pub fn parse(uri: &'a str) -> Result<Self, String> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| "not a data URI".to_string())?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| "data URI has no payload separator".to_string())?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| "data URI is not base64 encoded".to_string())?;

        Ok(Self {
            mime: if mime.is_empty() { OCTET_STREAM } else { mime },
            payload,
        })
    }

    /// Length of the base64 payload
    pub fn encoded_len(&self) -> usize {
        self.payload.len()
    }

    /// Decode the payload bytes
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        // Pretty-printers sometimes wrap long attribute values
        if self.payload.contains(|c: char| c.is_ascii_whitespace()) {
            let compact: String = self
                .payload
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            STANDARD.decode(compact)
        } else {
            STANDARD.decode(self.payload)
        }
    }
}

/// Encode bytes as a data URI
pub fn encode(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(data))
}

/// Length of the base64 text produced for `raw_len` input bytes
pub fn base64_len(raw_len: usize) -> u64 {
    (raw_len as u64).div_ceil(3) * 4
}

/// Identify a payload by its leading bytes
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    let starts = |magic: &[u8]| data.starts_with(magic);

    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some(match &data[8..12] {
            b"M4A " | b"M4B " => "audio/mp4",
            b"qt  " => "video/quicktime",
            _ => "video/mp4",
        });
    }
    if data.len() >= 12 && starts(b"RIFF") {
        return match &data[8..12] {
            b"WAVE" => Some("audio/wav"),
            b"WEBP" => Some("image/webp"),
            _ => None,
        };
    }
    if starts(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }
    if starts(b"OggS") {
        return Some("audio/ogg");
    }
    if starts(b"fLaC") {
        return Some("audio/flac");
    }
    if starts(b"ID3") {
        return Some("audio/mpeg");
    }
    if data.len() >= 2 && data[0] == 0xFF {
        // ADTS AAC has layer bits 00, MPEG audio frames do not
        if data[1] & 0xF6 == 0xF0 {
            return Some("audio/aac");
        }
        if data[1] & 0xE0 == 0xE0 {
            return Some("audio/mpeg");
        }
    }
    if starts(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if starts(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if starts(b"GIF87a") || starts(b"GIF89a") {
        return Some("image/gif");
    }
    None
}

/// Identify a payload by its file extension
pub fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    Some(match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    })
}

/// Content first, then extension, then octet-stream
pub fn infer_mime(data: &[u8], file_name: Option<&str>) -> &'static str {
    sniff_mime(data)
        .or_else(|| file_name.and_then(mime_from_extension))
        .unwrap_or(OCTET_STREAM)
}

/// File extension commonly used for a MIME type (decoder hints)
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    Some(match mime {
        "video/mp4" | "audio/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/aac" => "aac",
        "audio/flac" => "flac",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_then_parse() {
        let uri = encode("audio/wav", b"RIFF");
        assert_eq!(uri, "data:audio/wav;base64,UklGRg==");

        let parsed = DataUri::parse(&uri).unwrap();
        assert_eq!(parsed.mime, "audio/wav");
        assert_eq!(parsed.decode().unwrap(), b"RIFF");
        assert_eq!(parsed.encoded_len() as u64, base64_len(4));
    }

    #[test]
    fn test_parse_rejects_non_base64() {
        assert!(DataUri::parse("data:text/plain,hello").is_err());
        assert!(DataUri::parse("clip.mp4").is_err());
        assert!(DataUri::parse("data:video/mp4;base64").is_err());
    }

    #[test]
    fn test_decode_tolerates_wrapped_payload() {
        let parsed = DataUri::parse("data:audio/wav;base64,Ukl\n  GRg==").unwrap();
        assert_eq!(parsed.decode().unwrap(), b"RIFF");
    }

    #[test]
    fn test_sniff_common_formats() {
        let mut mp4 = vec![0, 0, 0, 0x18];
        mp4.extend_from_slice(b"ftypisom\0\0\0\0");
        assert_eq!(sniff_mime(&mp4), Some("video/mp4"));

        let mut wav = b"RIFF\0\0\0\0WAVE".to_vec();
        wav.extend_from_slice(b"fmt ");
        assert_eq!(sniff_mime(&wav), Some("audio/wav"));

        assert_eq!(sniff_mime(b"ID3\x04"), Some("audio/mpeg"));
        assert_eq!(sniff_mime(&[0xFF, 0xFB, 0x90]), Some("audio/mpeg"));
        assert_eq!(sniff_mime(&[0xFF, 0xF1, 0x50]), Some("audio/aac"));
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\n"), Some("image/png"));
        assert_eq!(sniff_mime(b"plain"), None);
    }

    #[test]
    fn test_infer_falls_back_to_extension() {
        assert_eq!(infer_mime(b"????", Some("clip.MP4")), "video/mp4");
        assert_eq!(infer_mime(b"????", Some("noext")), OCTET_STREAM);
        assert_eq!(infer_mime(b"????", None), OCTET_STREAM);
    }
}
