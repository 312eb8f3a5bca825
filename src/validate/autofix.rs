//! Deterministic textual repairs for known defect classes.
//!
//! Every repair is idempotent and so is their composition:
//! `auto_fix(&auto_fix(doc)) == auto_fix(doc)`.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

/// One class of repair that was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Repair {
    /// HTML named entities rewritten as numeric references
    HtmlEntities,
    /// `&` not starting a reference escaped as `&amp;`
    BareAmpersands,
    /// Valueless, unquoted or unseparated attributes normalised
    Attributes,
    /// Closing tag appended for an unclosed root element
    RootCloseTag,
}

/// Repaired document plus what was done to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixOutcome {
    pub document: String,
    pub repairs: Vec<Repair>,
}

impl FixOutcome {
    pub fn changed(&self) -> bool {
        !self.repairs.is_empty()
    }
}

/// XML's predefined entities
const XML_ENTITIES: [&str; 5] = ["amp", "lt", "gt", "quot", "apos"];

/// HTML entities commonly found in pasted text
const HTML_ENTITIES: &[(&str, u32)] = &[
    ("nbsp", 160),
    ("iexcl", 161),
    ("cent", 162),
    ("pound", 163),
    ("yen", 165),
    ("sect", 167),
    ("copy", 169),
    ("laquo", 171),
    ("shy", 173),
    ("reg", 174),
    ("deg", 176),
    ("plusmn", 177),
    ("para", 182),
    ("middot", 183),
    ("raquo", 187),
    ("frac12", 189),
    ("iquest", 191),
    ("times", 215),
    ("divide", 247),
    ("ndash", 8211),
    ("mdash", 8212),
    ("lsquo", 8216),
    ("rsquo", 8217),
    ("ldquo", 8220),
    ("rdquo", 8221),
    ("bull", 8226),
    ("hellip", 8230),
    ("euro", 8364),
    ("trade", 8482),
];

fn ampersand_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(?:#[0-9]+;|#[xX][0-9a-fA-F]+;|([A-Za-z][A-Za-z0-9]*);)?")
            .expect("ampersand regex should compile")
    })
}

/// Apply every repair once, in a fixed order
pub fn auto_fix(doc: &str) -> String {
    auto_fix_with_report(doc).document
}

/// Like [`auto_fix`], also reporting which repairs changed the text
pub fn auto_fix_with_report(doc: &str) -> FixOutcome {
    let mut repairs = Vec::new();

    let (text, html, bare) = fix_entities(doc);
    if html {
        repairs.push(Repair::HtmlEntities);
    }
    if bare {
        repairs.push(Repair::BareAmpersands);
    }

    let attributes = match fix_attributes(&text) {
        Cow::Owned(fixed) => Some(fixed),
        Cow::Borrowed(_) => None,
    };
    let text = match attributes {
        Some(fixed) => {
            repairs.push(Repair::Attributes);
            Cow::Owned(fixed)
        }
        None => text,
    };

    let text = match fix_root_close(&text) {
        Some(fixed) => {
            repairs.push(Repair::RootCloseTag);
            Cow::Owned(fixed)
        }
        None => text,
    };

    FixOutcome {
        document: text.into_owned(),
        repairs,
    }
}

/// Rewrite HTML entities as numeric references and escape stray `&`.
///
/// Unknown named references are escaped too, so `&foo;` becomes literal text.
fn fix_entities(doc: &str) -> (Cow<'_, str>, bool, bool) {
    if !doc.contains('&') {
        return (Cow::Borrowed(doc), false, false);
    }

    let mut html = false;
    let mut bare = false;
    let fixed = ampersand_regex().replace_all(doc, |caps: &Captures| {
        let whole = &caps[0];
        if whole.len() == 1 {
            bare = true;
            return "&amp;".to_string();
        }
        let Some(name) = caps.get(1).map(|m| m.as_str()) else {
            // numeric reference
            return whole.to_string();
        };
        if XML_ENTITIES.contains(&name) {
            return whole.to_string();
        }
        match HTML_ENTITIES.iter().find(|(entity, _)| *entity == name) {
            Some((_, code)) => {
                html = true;
                format!("&#{};", code)
            }
            None => {
                bare = true;
                format!("&amp;{};", name)
            }
        }
    });

    (fixed, html, bare)
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':'
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b':' | b'.' | b'-')
}

/// Normalise attributes in every start tag.
///
/// `controls` becomes `controls="controls"`, `width=10` becomes
/// `width="10"` and attributes written back to back get a separating space.
/// Comments, CDATA, processing instructions and declarations are skipped.
fn fix_attributes(doc: &str) -> Cow<'_, str> {
    let bytes = doc.as_bytes();
    let mut out = String::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        let rest = &doc[i..];
        let skip_to = [("<!--", "-->"), ("<![CDATA[", "]]>"), ("<?", "?>"), ("<!", ">")]
            .iter()
            .find(|(open, _)| rest.starts_with(open))
            .map(|(open, close)| {
                rest[open.len()..]
                    .find(close)
                    .map(|end| i + open.len() + end + close.len())
                    .unwrap_or(bytes.len())
            });
        if let Some(next) = skip_to {
            i = next;
            continue;
        }

        if !bytes.get(i + 1).copied().is_some_and(is_name_start) {
            i += 1;
            continue;
        }

        match rewrite_start_tag(rest) {
            Some((consumed, Some(rewritten))) => {
                out.push_str(&doc[copied..i]);
                out.push_str(&rewritten);
                copied = i + consumed;
                i = copied;
            }
            Some((consumed, None)) => i += consumed,
            None => i += 1,
        }
    }

    if copied == 0 && out.is_empty() {
        return Cow::Borrowed(doc);
    }
    out.push_str(&doc[copied..]);
    Cow::Owned(out)
}

/// Parse one start tag at the beginning of `tag`.
///
/// Returns the consumed length and the rewritten tag if anything changed.
/// `None` means the tag is too broken to repair safely.
fn rewrite_start_tag(tag: &str) -> Option<(usize, Option<String>)> {
    let b = tag.as_bytes();
    let len = b.len();
    let mut j = 1;
    while j < len && is_name_char(b[j]) {
        j += 1;
    }

    let mut out = String::with_capacity(tag.len().min(256));
    out.push_str(&tag[..j]);
    let mut changed = false;

    loop {
        let ws_start = j;
        while j < len && b[j].is_ascii_whitespace() {
            j += 1;
        }
        if j >= len {
            return None;
        }
        let ws = &tag[ws_start..j];

        match b[j] {
            b'>' => {
                out.push_str(ws);
                out.push('>');
                return Some((j + 1, changed.then_some(out)));
            }
            b'/' if b.get(j + 1) == Some(&b'>') => {
                out.push_str(ws);
                out.push_str("/>");
                return Some((j + 2, changed.then_some(out)));
            }
            c if is_name_start(c) => {
                if ws.is_empty() {
                    out.push(' ');
                    changed = true;
                } else {
                    out.push_str(ws);
                }

                let name_start = j;
                while j < len && is_name_char(b[j]) {
                    j += 1;
                }
                let name = &tag[name_start..j];

                let mut k = j;
                while k < len && b[k].is_ascii_whitespace() {
                    k += 1;
                }

                if k < len && b[k] == b'=' {
                    k += 1;
                    while k < len && b[k].is_ascii_whitespace() {
                        k += 1;
                    }
                    if k >= len {
                        return None;
                    }
                    if b[k] == b'"' || b[k] == b'\'' {
                        let quote = b[k] as char;
                        let end = k + 1 + tag[k + 1..].find(quote)?;
                        out.push_str(&tag[name_start..=end]);
                        j = end + 1;
                    } else {
                        let value_start = k;
                        while k < len
                            && !b[k].is_ascii_whitespace()
                            && b[k] != b'>'
                            && b[k] != b'<'
                            && !(b[k] == b'/' && b.get(k + 1) == Some(&b'>'))
                        {
                            k += 1;
                        }
                        let value = &tag[value_start..k];
                        if value.is_empty() || value.contains(['"', '\'']) {
                            return None;
                        }
                        out.push_str(name);
                        out.push_str("=\"");
                        out.push_str(value);
                        out.push('"');
                        changed = true;
                        j = k;
                    }
                } else {
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(name);
                    out.push('"');
                    changed = true;
                }
            }
            _ => return None,
        }
    }
}

/// Skip the XML declaration, comments, doctype and whitespace before the root
pub(crate) fn skip_prolog(doc: &str) -> usize {
    let mut pos = 0;
    loop {
        let rest = &doc[pos..];
        let trimmed = rest.trim_start();
        pos += rest.len() - trimmed.len();

        let close = if trimmed.starts_with("<?") {
            "?>"
        } else if trimmed.starts_with("<!--") {
            "-->"
        } else if trimmed.starts_with("<!") {
            ">"
        } else {
            return pos;
        };

        match trimmed.find(close) {
            Some(end) => pos += end + close.len(),
            None => return doc.len(),
        }
    }
}

/// Root element name and whether its start tag is self-closing
pub(crate) fn root_start_tag(doc: &str) -> Option<(&str, bool)> {
    let start = skip_prolog(doc);
    let rest = doc.get(start..)?;
    let b = rest.as_bytes();
    if b.first() != Some(&b'<') || !b.get(1).copied().is_some_and(is_name_start) {
        return None;
    }

    let mut end = 1;
    while end < b.len() && is_name_char(b[end]) {
        end += 1;
    }
    let name = &rest[1..end];

    // Find the end of the start tag, honouring quoted values
    let mut quote: Option<u8> = None;
    for (idx, &c) in b.iter().enumerate().skip(end) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(c),
            (None, b'>') => return Some((name, idx > 0 && b[idx - 1] == b'/')),
            (None, b'<') => return None,
            _ => {}
        }
    }
    None
}

/// Whether `</name>` (optionally with trailing whitespace) appears in `doc`
pub(crate) fn has_close_tag(doc: &str, name: &str) -> bool {
    let needle = format!("</{}", name);
    let mut search = 0;
    while let Some(rel) = doc[search..].find(&needle) {
        let after = search + rel + needle.len();
        if doc[after..].trim_start().starts_with('>') {
            return true;
        }
        search = after;
    }
    false
}

/// Append the root's closing tag when it is missing and nothing else is
fn fix_root_close(doc: &str) -> Option<String> {
    let (name, self_closing) = root_start_tag(doc)?;
    if self_closing || has_close_tag(doc, name) {
        return None;
    }

    let body = doc.trim_end();
    let mut fixed = String::with_capacity(body.len() + name.len() + 4);
    fixed.push_str(body);
    fixed.push_str("\n</");
    fixed.push_str(name);
    fixed.push_str(">\n");
    Some(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bare_ampersands_are_escaped() {
        let out = auto_fix_with_report("<p>Tom & Jerry &amp; friends &#38; &#x26;</p>");
        assert_eq!(
            out.document,
            "<p>Tom &amp; Jerry &amp; friends &#38; &#x26;</p>"
        );
        assert_eq!(out.repairs, vec![Repair::BareAmpersands]);
    }

    #[test]
    fn test_html_entities_become_numeric() {
        let out = auto_fix_with_report("<p>a&nbsp;b &copy; &bogus;</p>");
        assert_eq!(out.document, "<p>a&#160;b &#169; &amp;bogus;</p>");
        assert_eq!(out.repairs, vec![Repair::HtmlEntities, Repair::BareAmpersands]);
    }

    #[test]
    fn test_boolean_attributes_get_values() {
        let out = auto_fix(r#"<svg><video id="v" controls autoplay/><audio muted></audio></svg>"#);
        assert_eq!(
            out,
            r#"<svg><video id="v" controls="controls" autoplay="autoplay"/><audio muted="muted"></audio></svg>"#
        );
    }

    #[test]
    fn test_unquoted_and_unseparated_attributes() {
        let out = auto_fix(r#"<svg width=10 height="5"x="1"/>"#);
        assert_eq!(out, r#"<svg width="10" height="5" x="1"/>"#);
    }

    #[test]
    fn test_comments_and_cdata_are_untouched() {
        let doc = "<svg><!-- <video controls> --><![CDATA[<audio muted>]]></svg>";
        assert_eq!(auto_fix(doc), doc);
    }

    #[test]
    fn test_missing_root_close_is_appended() {
        let doc = "<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\">\n  <g id=\"a\"></g>\n";
        let out = auto_fix_with_report(doc);
        assert_eq!(out.repairs, vec![Repair::RootCloseTag]);
        assert!(out.document.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_self_closing_root_needs_no_close() {
        assert_eq!(auto_fix("<svg/>"), "<svg/>");
        assert_eq!(root_start_tag("<svg a=\"x>y\"/>"), Some(("svg", true)));
    }

    #[test]
    fn test_well_formed_input_is_unchanged() {
        let doc = r#"<svg xmlns="http://www.w3.org/2000/svg"><title>a &amp; b</title></svg>"#;
        let out = auto_fix_with_report(doc);
        assert!(!out.changed());
        assert_eq!(out.document, doc);
    }

    #[test]
    fn test_close_tag_detection() {
        assert!(has_close_tag("<svg></svg >", "svg"));
        assert!(!has_close_tag("<svg></svgx>", "svg"));
    }

    proptest! {
        #[test]
        fn prop_auto_fix_is_idempotent(
            body in r#"[a-z<>&;="' /#0-9]{0,80}"#,
            close in any::<bool>(),
        ) {
            let doc = if close {
                format!("<svg>{}</svg>", body)
            } else {
                format!("<svg>{}", body)
            };
            let once = auto_fix(&doc);
            let twice = auto_fix(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
