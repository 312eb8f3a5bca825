//! Fallback backend for builds without a structural parser.

use super::autofix::{has_close_tag, root_start_tag, skip_prolog};
use super::{Backend, BackendKind, Findings};

/// Checks only that a root element exists and that its close tag is the
/// last thing in the document. Nested structure is never verified.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicBackend;

impl Backend for HeuristicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Heuristic
    }

    fn check(&self, doc: &str) -> Findings {
        let mut findings = Findings::default();

        let Some((name, self_closing)) = root_start_tag(doc) else {
            let start = skip_prolog(doc);
            if doc[start..].trim().is_empty() {
                findings
                    .errors
                    .push("document has no root element".to_string());
            } else {
                findings
                    .errors
                    .push("document does not start with an element".to_string());
            }
            return findings;
        };

        findings.root = Some(name.to_string());
        findings.root_has_namespace = root_declares_namespace(&doc[skip_prolog(doc)..]);

        if !self_closing {
            let close = format!("</{}>", name);
            if !doc.trim_end().ends_with(&close) {
                if has_close_tag(doc, name) {
                    findings
                        .errors
                        .push(format!("content follows the closing </{}> tag", name));
                } else {
                    findings
                        .errors
                        .push(format!("root element <{}> is never closed", name));
                }
            }
        }

        if findings.errors.is_empty() {
            findings
                .warnings
                .push("heuristic check: nested structure was not verified".to_string());
        }

        findings
    }
}

/// Look for `xmlns=` inside the root start tag
fn root_declares_namespace(from_root: &str) -> bool {
    let end = from_root.find('>').unwrap_or(from_root.len());
    let tag = &from_root[..end];
    tag.split_ascii_whitespace()
        .any(|part| part.starts_with("xmlns="))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_close_tag() {
        let findings = HeuristicBackend.check(
            "<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"><g></svg>\n",
        );
        // Unbalanced <g> is beyond what this backend can see
        assert!(findings.is_valid());
        assert_eq!(findings.root.as_deref(), Some("svg"));
        assert!(findings.root_has_namespace);
    }

    #[test]
    fn test_missing_close_tag() {
        let findings = HeuristicBackend.check("<svg><g></g>");
        assert!(findings.errors[0].contains("never closed"));
    }

    #[test]
    fn test_trailing_content() {
        let findings = HeuristicBackend.check("<svg></svg><svg></svg>x");
        assert!(findings.errors[0].contains("follows"));
    }

    #[test]
    fn test_no_root() {
        assert!(!HeuristicBackend.check("").is_valid());
        assert!(!HeuristicBackend.check("hello").is_valid());
        assert!(HeuristicBackend.check("<svg/>").is_valid());
    }
}
