//! Concurrency Tests
//!
//! Mutations of one project are serialized; a second one is rejected.

mod common;

use tempfile::TempDir;
use ytbundle::{ErrorKind, ProjectId, ProjectMetadata};

#[tokio::test]
async fn test_mutations_rejected_while_lock_held() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);
    service
        .build("busy", common::demo_assets(common::audible_wav()), ProjectMetadata::titled("One"))
        .await
        .into_result()
        .unwrap();
    service
        .build("busy", common::demo_assets(common::audible_wav()), ProjectMetadata::titled("Two"))
        .await
        .into_result()
        .unwrap();

    let id = ProjectId::parse("busy").unwrap();
    let guard = service.registry().versions().locks().try_acquire(&id).unwrap();

    let build = service
        .build("busy", common::demo_assets(common::audible_wav()), ProjectMetadata::titled("Three"))
        .await;
    assert_eq!(build.error.unwrap().kind, ErrorKind::Conflict);
    let restore = service.restore_version("busy", "1").await;
    assert_eq!(restore.error.unwrap().kind, ErrorKind::Conflict);
    let delete = service.delete_project("busy").await;
    assert_eq!(delete.error.unwrap().kind, ErrorKind::Conflict);

    // Reads are not blocked
    let meta = service.get_metadata("busy").await.into_result().unwrap();
    assert_eq!(meta.metadata.title.as_deref(), Some("Two"));
    assert_eq!(service.list_versions("busy").await.into_result().unwrap().len(), 1);

    // Other projects are unaffected
    service
        .build("other", common::demo_assets(common::audible_wav()), ProjectMetadata::default())
        .await
        .into_result()
        .unwrap();

    drop(guard);
    service.restore_version("busy", "1").await.into_result().unwrap();
}

#[tokio::test]
async fn test_concurrent_builds_never_reuse_version_numbers() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);
    service
        .build("race", common::demo_assets(common::audible_wav()), ProjectMetadata::titled("base"))
        .await
        .into_result()
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .build(
                    "race",
                    common::demo_assets(common::audible_wav()),
                    ProjectMetadata::titled(format!("edit {n}")),
                )
                .await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        let response = handle.await.unwrap();
        match response.error {
            None => committed += 1,
            Some(error) => assert_eq!(error.kind, ErrorKind::Conflict),
        }
    }
    assert!(committed >= 1);

    let versions = service.list_versions("race").await.into_result().unwrap();
    let numbers: Vec<u32> = versions.iter().map(|i| i.version.number()).collect();
    let expected: Vec<u32> = (1..=committed).collect();
    assert_eq!(numbers, expected);
}
