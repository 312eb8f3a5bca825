//! Validator Integration Tests
//!
//! Auto-repair of malformed containers on the commit path.

mod common;

use tempfile::TempDir;
use ytbundle::config::ValidatorSettings;
use ytbundle::{ErrorKind, ProjectId, Validator};

const MISSING_ROOT_CLOSE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
  <title>Demo</title>
  <metadata id="project-metadata"/>
  <g id="layer-background"><rect width="100%" height="100%"/></g>
"#;

#[test]
fn test_missing_root_close_is_repaired() {
    let validator = Validator::new(&ValidatorSettings::default()).unwrap();
    let result = validator.validate(MISSING_ROOT_CLOSE);

    assert!(result.valid, "errors: {:?}", result.errors);
    assert!(result.was_auto_fixed);
    let fixed = result.fixed_document.as_deref().unwrap();
    assert!(fixed.trim_end().ends_with("</svg>"));

    // The repaired form is stable
    let again = validator.validate(fixed);
    assert!(again.valid);
    assert!(!again.was_auto_fixed);
}

#[test]
fn test_html_entities_are_repaired() {
    let validator = Validator::new(&ValidatorSettings::default()).unwrap();
    let doc = r#"<svg xmlns="http://www.w3.org/2000/svg"><metadata/><text>Fish&nbsp;&amp;&nbsp;chips & peas</text></svg>"#;

    let result = validator.validate(doc);
    assert!(result.valid, "errors: {:?}", result.errors);
    assert!(result.was_auto_fixed);
    let fixed = result.fixed_document.unwrap();
    assert!(fixed.contains("Fish&#160;&amp;&#160;chips &amp; peas"));
}

#[test]
fn test_plain_text_is_unfixable() {
    let validator = Validator::new(&ValidatorSettings::default()).unwrap();
    let result = validator.validate("this was never markup");
    assert!(!result.valid);
    assert!(!result.errors.is_empty());
    assert!(result.fixed_document.is_none());
}

#[tokio::test]
async fn test_commit_stores_repaired_document() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);
    let id = ProjectId::parse("fixme").unwrap();
    let versions = service.registry().versions();

    let outcome = versions.commit(&id, MISSING_ROOT_CLOSE).await.unwrap();
    assert!(outcome.validation.was_auto_fixed);

    let active = versions.active(&id).await.unwrap().unwrap();
    assert!(active.trim_end().ends_with("</svg>"));

    let check = service.validate("fixme").await.into_result().unwrap();
    assert!(check.valid);
    assert!(!check.was_auto_fixed);
}

#[tokio::test]
async fn test_unfixable_commit_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let service = common::service(&temp);
    let id = ProjectId::parse("broken").unwrap();

    let err = service
        .registry()
        .versions()
        .commit(&id, "this was never markup")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert!(!temp.path().join("projects/broken").exists());
}
