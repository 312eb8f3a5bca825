//! Shared fixtures: synthetic media payloads and isolated registries.

#![allow(dead_code)]

use std::f64::consts::PI;
use std::io::Cursor;

use tempfile::TempDir;
use ytbundle::config::{BackendChoice, ResolvedConfig};
use ytbundle::{AssetSource, BuildAssets, Service};

pub const SAMPLE_RATE: u32 = 8000;
pub const SECONDS: u32 = 2;

/// 16-bit mono PCM WAV with the given samples
fn wav(samples: impl Iterator<Item = i16>) -> Vec<u8> {
    let pcm: Vec<u8> = samples.flat_map(|s| s.to_le_bytes()).collect();
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    out.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(&pcm);
    out
}

/// Half-scale 440 Hz sine, about -9 dBFS
pub fn audible_wav() -> Vec<u8> {
    let total = SAMPLE_RATE * SECONDS;
    wav((0..total).map(|n| {
        let t = f64::from(n) / f64::from(SAMPLE_RATE);
        ((2.0 * PI * 440.0 * t).sin() * 16384.0) as i16
    }))
}

/// One-LSB dither, about -90 dBFS
pub fn silent_wav() -> Vec<u8> {
    let total = SAMPLE_RATE * SECONDS;
    wav((0..total).map(|n| if n % 2 == 0 { 1 } else { -1 }))
}

fn mp4_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

/// Minimal MP4: `ftyp` plus a `moov` whose `mvhd` declares 2 seconds and a
/// single video track
pub fn mp4_without_sound() -> Vec<u8> {
    let mut mvhd = vec![0u8; 4];
    mvhd.extend_from_slice(&[0u8; 8]);
    mvhd.extend_from_slice(&1000u32.to_be_bytes());
    mvhd.extend_from_slice(&2000u32.to_be_bytes());
    mvhd.extend_from_slice(&[0u8; 80]);

    let mut hdlr = vec![0u8; 8];
    hdlr.extend_from_slice(b"vide");
    hdlr.extend_from_slice(&[0u8; 13]);

    let mut moov = mp4_box(b"mvhd", &mvhd);
    moov.extend(mp4_box(b"trak", &mp4_box(b"mdia", &mp4_box(b"hdlr", &hdlr))));

    let mut data = mp4_box(b"ftyp", b"isom\0\0\0\0");
    data.extend(mp4_box(b"moov", &moov));
    data
}

/// 16x9 PNG thumbnail
pub fn png_thumbnail() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(16, 9, image::Rgb([200, 40, 40]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub const DEMO_SCRIPT: &str = "# Demo\n\nScript with <tags> & ampersands.";

pub fn demo_assets(audio: Vec<u8>) -> BuildAssets {
    scripted_assets(DEMO_SCRIPT, audio)
}

pub fn scripted_assets(script: &str, audio: Vec<u8>) -> BuildAssets {
    BuildAssets::new(script)
        .with_video(AssetSource::named_bytes(mp4_without_sound(), "demo.mp4"))
        .with_audio(AssetSource::named_bytes(audio, "demo.wav"))
        .with_thumbnail(AssetSource::named_bytes(png_thumbnail(), "thumbnail.png"))
}

/// Service over a fresh registry root
pub fn service(temp: &TempDir) -> Service {
    Service::new(&ResolvedConfig::with_root(temp.path())).unwrap()
}

pub fn heuristic_service(temp: &TempDir) -> Service {
    let mut config = ResolvedConfig::with_root(temp.path());
    config.validator.backend = BackendChoice::Heuristic;
    Service::new(&config).unwrap()
}
