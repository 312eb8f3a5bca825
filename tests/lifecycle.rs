//! Lifecycle Integration Tests
//!
//! Build, edit, list and restore a project through the service facade.

mod common;

use tempfile::TempDir;
use ytbundle::domain::SnapshotReason;
use ytbundle::{ErrorKind, ProjectId, ProjectMetadata, VersionId};

fn v(n: u32) -> VersionId {
    VersionId::new(n).unwrap()
}

#[tokio::test]
async fn test_build_edit_restore_round_trip() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);

    let built = service
        .build(
            "demo",
            common::demo_assets(common::audible_wav()),
            ProjectMetadata::titled("Demo").with_theme("tech"),
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(built.commit.snapshot, None);
    assert!(built.commit.validation.valid);
    assert!(!built.commit.validation.was_auto_fixed);
    assert!(built.embedded_bytes > 0);
    assert!(!temp.path().join("projects/demo/versions").exists());

    let versions = service.list_versions("demo").await.into_result().unwrap();
    assert!(versions.is_empty());

    let original = service
        .registry()
        .versions()
        .active(&ProjectId::parse("demo").unwrap())
        .await
        .unwrap()
        .unwrap();

    let edited = service
        .update_metadata("demo", ProjectMetadata::titled("Demo, revised"))
        .await
        .into_result()
        .unwrap();
    assert_eq!(edited.commit.snapshot, Some(v(1)));

    let versions = service.list_versions("demo").await.into_result().unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, v(1));
    assert_eq!(versions[0].reason, SnapshotReason::Commit);
    assert_eq!(versions[0].title.as_deref(), Some("Demo"));

    let restored = service
        .restore_version("demo", "v1")
        .await
        .into_result()
        .unwrap();
    assert_eq!(restored.restored, v(1));
    assert_eq!(restored.snapshot, Some(v(2)));

    let active = service
        .registry()
        .versions()
        .active(&ProjectId::parse("demo").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active, original);

    let versions = service.list_versions("demo").await.into_result().unwrap();
    let numbers: Vec<u32> = versions.iter().map(|i| i.version.number()).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(versions[1].reason, SnapshotReason::Restore { target: v(1) });
    assert_eq!(versions[1].title.as_deref(), Some("Demo, revised"));

    let meta = service.get_metadata("demo").await.into_result().unwrap();
    assert_eq!(meta.metadata.title.as_deref(), Some("Demo"));
    assert_eq!(meta.metadata.theme.as_deref(), Some("tech"));
    assert_eq!(meta.markdown_content.as_deref(), Some(common::DEMO_SCRIPT));
}

#[tokio::test]
async fn test_restore_brings_back_source_text() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);

    for script in ["# Take one\n\npre-edit script", "# Take two\n\npost-edit script"] {
        service
            .build(
                "demo",
                common::scripted_assets(script, common::audible_wav()),
                ProjectMetadata::titled("Demo"),
            )
            .await
            .into_result()
            .unwrap();
    }

    let meta = service.get_metadata("demo").await.into_result().unwrap();
    assert_eq!(
        meta.markdown_content.as_deref(),
        Some("# Take two\n\npost-edit script")
    );

    service
        .restore_version("demo", "v1")
        .await
        .into_result()
        .unwrap();

    let meta = service.get_metadata("demo").await.into_result().unwrap();
    assert_eq!(
        meta.markdown_content.as_deref(),
        Some("# Take one\n\npre-edit script")
    );
    let cached = std::fs::read_to_string(temp.path().join("projects/demo/demo.md")).unwrap();
    assert_eq!(cached, "# Take one\n\npre-edit script");

    // Restoring is itself reversible
    service
        .restore_version("demo", "v2")
        .await
        .into_result()
        .unwrap();
    let meta = service.get_metadata("demo").await.into_result().unwrap();
    assert_eq!(
        meta.markdown_content.as_deref(),
        Some("# Take two\n\npost-edit script")
    );
}

#[tokio::test]
async fn test_repair_of_damaged_active_container() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);
    service
        .build(
            "demo",
            common::demo_assets(common::audible_wav()),
            ProjectMetadata::titled("Demo"),
        )
        .await
        .into_result()
        .unwrap();

    let path = temp.path().join("projects/demo/demo.svg");
    let doc = std::fs::read_to_string(&path).unwrap();
    let broken = doc.trim_end().trim_end_matches("</svg>").to_string();
    std::fs::write(&path, &broken).unwrap();
    let before = service.validate("demo").await.into_result().unwrap();
    assert!(before.was_auto_fixed);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), broken);

    let report = service.repair("demo").await.into_result().unwrap();
    assert!(report.repaired);
    assert_eq!(report.snapshot, Some(v(1)));
    let after = service.validate("demo").await.into_result().unwrap();
    assert!(after.valid && !after.was_auto_fixed);

    let snapshot =
        std::fs::read_to_string(temp.path().join("projects/demo/versions/demo_v1.svg")).unwrap();
    assert_eq!(snapshot, broken);
    let meta = service.get_metadata("demo").await.into_result().unwrap();
    assert_eq!(meta.metadata.title.as_deref(), Some("Demo"));
}

#[tokio::test]
async fn test_rebuild_snapshots_previous_build() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);

    for title in ["One", "Two", "Three"] {
        service
            .build(
                "demo",
                common::demo_assets(common::audible_wav()),
                ProjectMetadata::titled(title),
            )
            .await
            .into_result()
            .unwrap();
    }

    let versions = service.list_versions("demo").await.into_result().unwrap();
    let titles: Vec<_> = versions.iter().map(|i| i.title.clone().unwrap()).collect();
    assert_eq!(titles, vec!["One", "Two"]);
    assert!(temp.path().join("projects/demo/versions/demo_v2.svg").exists());
    assert!(temp.path().join("projects/demo/versions/demo_v2.json").exists());
}

#[tokio::test]
async fn test_build_failure_leaves_no_project() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);

    let assets = ytbundle::BuildAssets::new("no media at all");
    let response = service
        .build("demo", assets, ProjectMetadata::default())
        .await;
    assert_eq!(response.error.unwrap().kind, ErrorKind::BuildError);
    assert!(!temp.path().join("projects/demo").exists());
}

#[tokio::test]
async fn test_restore_of_corrupted_version_is_refused() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);

    for title in ["One", "Two"] {
        service
            .build(
                "demo",
                common::demo_assets(common::audible_wav()),
                ProjectMetadata::titled(title),
            )
            .await
            .into_result()
            .unwrap();
    }

    let snapshot = temp.path().join("projects/demo/versions/demo_v1.svg");
    std::fs::write(&snapshot, "this is no longer a container").unwrap();
    let active_before = std::fs::read(temp.path().join("projects/demo/demo.svg")).unwrap();

    let response = service.restore_version("demo", "1").await;
    assert_eq!(response.error.unwrap().kind, ErrorKind::RestoreError);

    let active_after = std::fs::read(temp.path().join("projects/demo/demo.svg")).unwrap();
    assert_eq!(active_before, active_after);
    assert_eq!(service.list_versions("demo").await.into_result().unwrap().len(), 1);
}
