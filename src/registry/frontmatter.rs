//! YAML frontmatter in legacy source files

use serde_json::Value;
use tracing::warn;

const FENCE: &str = "---";

/// Split `text` into its frontmatter mapping and the remaining body.
///
/// Without a leading `---` fence, or when the block is not a YAML mapping,
/// the whole text is the body.
pub fn split_frontmatter(text: &str) -> (Option<Value>, &str) {
    let trimmed = text.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed
        .strip_prefix(FENCE)
        .and_then(|r| r.strip_prefix("\r\n").or_else(|| r.strip_prefix('\n')))
    else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let yaml = &rest[..offset];
            let body = rest[offset + line.len()..].trim_start_matches(['\r', '\n']);
            return match parse_mapping(yaml) {
                Some(value) => (Some(value), body),
                None => (None, text),
            };
        }
        offset += line.len();
    }

    // Unterminated fence
    (None, text)
}

fn parse_mapping(yaml: &str) -> Option<Value> {
    let parsed: serde_yaml::Value = match serde_yaml::from_str(yaml) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Frontmatter is not valid YAML");
            return None;
        }
    };
    match serde_json::to_value(parsed) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Frontmatter has keys JSON cannot represent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontmatter_and_body() {
        let text = "---\ntitle: Rust in 60s\ntags: [rust, short]\n---\n\n# Script\nHello\n";
        let (front, body) = split_frontmatter(text);
        let front = front.unwrap();
        assert_eq!(front["title"], "Rust in 60s");
        assert_eq!(front["tags"][1], "short");
        assert_eq!(body, "# Script\nHello\n");
    }

    #[test]
    fn test_no_fence_is_all_body() {
        let text = "# Just markdown\n---\nnot frontmatter\n";
        let (front, body) = split_frontmatter(text);
        assert!(front.is_none());
        assert_eq!(body, text);
    }

    #[test]
    fn test_unterminated_or_scalar_frontmatter() {
        let (front, body) = split_frontmatter("---\ntitle: x\nno closing fence");
        assert!(front.is_none());
        assert!(body.starts_with("---"));

        let (front, _) = split_frontmatter("---\njust a string\n---\nbody");
        assert!(front.is_none());
    }
}
