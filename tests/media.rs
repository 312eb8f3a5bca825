//! Media Integrity Tests
//!
//! Decode probes over embedded, linked and sibling payloads.

mod common;

use tempfile::TempDir;
use ytbundle::media::PayloadOrigin;
use ytbundle::{AssetSource, BuildAssets, ErrorKind, MediaKind, ProjectMetadata};

#[tokio::test]
async fn test_audible_project_is_playable() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);
    service
        .build("loud", common::demo_assets(common::audible_wav()), ProjectMetadata::default())
        .await
        .into_result()
        .unwrap();

    let report = service.check_playable("loud").await.into_result().unwrap();

    let video = report.get(MediaKind::Video).unwrap();
    assert!(video.exists && video.decodable);
    assert_eq!(video.duration_seconds, Some(2.0));
    assert!(!video.has_audio_track);
    assert!(video.is_silent);
    assert_eq!(video.origin, Some(PayloadOrigin::Embedded));

    let audio = report.get(MediaKind::Audio).unwrap();
    assert!(audio.decodable);
    assert!(!audio.is_silent);
    let duration = audio.duration_seconds.unwrap();
    assert!((duration - 2.0).abs() < 0.05, "duration {duration}");
    let level = audio.mean_volume_db.unwrap();
    assert!(level > -20.0 && level < 0.0, "level {level}");

    let thumb = report.get(MediaKind::Thumbnail).unwrap();
    assert_eq!((thumb.width, thumb.height), (Some(16), Some(9)));
}

#[tokio::test]
async fn test_silent_audio_blocks_playback() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);
    service
        .build("quiet", common::demo_assets(common::silent_wav()), ProjectMetadata::default())
        .await
        .into_result()
        .unwrap();

    let report = service.check_media("quiet").await.into_result().unwrap();
    let audio = report.get(MediaKind::Audio).unwrap();
    assert!(audio.decodable);
    assert!(audio.is_silent);
    assert!(audio.mean_volume_db.unwrap() < -50.0);

    // Structurally the project is fine
    assert!(service.validate("quiet").await.into_result().unwrap().valid);

    let gate = service.check_playable("quiet").await;
    assert_eq!(gate.error.unwrap().kind, ErrorKind::MediaProbeError);
}

#[tokio::test]
async fn test_linked_media_resolves_next_to_container() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);

    let assets = BuildAssets::new("linked")
        .with_video(AssetSource::Link("clip.mp4".to_string()))
        .with_audio(AssetSource::Link("voice.wav".to_string()));
    service
        .build("linked", assets, ProjectMetadata::default())
        .await
        .into_result()
        .unwrap();

    let dir = temp.path().join("projects/linked");
    std::fs::write(dir.join("clip.mp4"), common::mp4_without_sound()).unwrap();

    let report = service.check_media("linked").await.into_result().unwrap();
    let video = report.get(MediaKind::Video).unwrap();
    assert!(video.decodable);
    assert_eq!(video.origin, Some(PayloadOrigin::Linked));

    // voice.wav was never written
    let audio = report.get(MediaKind::Audio).unwrap();
    assert!(!audio.exists);
    assert!(report.ensure_playable().is_err());

    std::fs::write(dir.join("voice.wav"), common::audible_wav()).unwrap();
    let report = service.check_media("linked").await.into_result().unwrap();
    assert!(report.ensure_playable().is_ok());
}

#[tokio::test]
async fn test_legacy_sibling_media() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);

    let dir = temp.path().join("projects/old");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("old.mp4"), common::mp4_without_sound()).unwrap();
    std::fs::write(dir.join("old.wav"), b"RIFF but not really").unwrap();

    let report = service.check_media("old").await.into_result().unwrap();
    assert_eq!(
        report.get(MediaKind::Video).unwrap().origin,
        Some(PayloadOrigin::Sibling)
    );

    let audio = report.get(MediaKind::Audio).unwrap();
    assert!(audio.exists);
    assert!(!audio.decodable);
    assert!(audio.error.is_some());

    assert!(!report.get(MediaKind::Thumbnail).unwrap().exists);
}
