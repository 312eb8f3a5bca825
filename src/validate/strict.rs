//! Strict structural parse backed by quick-xml.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Backend, BackendKind, Findings};

/// Stop collecting after this many errors
const MAX_ERRORS: usize = 20;

/// Full well-formedness check: tag balance, attribute syntax, entity
/// references, a single root and no stray text outside it
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictBackend;

impl Backend for StrictBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Strict
    }

    fn check(&self, doc: &str) -> Findings {
        let mut findings = Findings::default();
        let mut reader = Reader::from_str(doc);
        reader.config_mut().check_end_names = true;

        let mut stack: Vec<String> = Vec::new();
        let mut roots = 0usize;

        loop {
            if findings.errors.len() >= MAX_ERRORS {
                findings
                    .warnings
                    .push(format!("stopped after {} errors", MAX_ERRORS));
                break;
            }

            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = element_name(&e);
                    if stack.is_empty() {
                        roots += 1;
                        on_root(&mut findings, &e, &name, roots);
                    }
                    check_attributes(&mut findings, &e, &name);
                    stack.push(name);
                }
                Ok(Event::Empty(e)) => {
                    let name = element_name(&e);
                    if stack.is_empty() {
                        roots += 1;
                        on_root(&mut findings, &e, &name, roots);
                    }
                    check_attributes(&mut findings, &e, &name);
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Text(e)) => {
                    if stack.is_empty() && !e.iter().all(|b| b.is_ascii_whitespace()) {
                        findings.errors.push(format!(
                            "text outside the root element near byte {}",
                            reader.buffer_position()
                        ));
                    }
                    if let Err(err) = e.unescape() {
                        findings.errors.push(format!(
                            "bad character reference near byte {}: {}",
                            reader.buffer_position(),
                            err
                        ));
                    }
                }
                Ok(Event::CData(_)) if stack.is_empty() => {
                    findings
                        .errors
                        .push("CDATA section outside the root element".to_string());
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    findings.errors.push(format!(
                        "malformed markup at byte {}: {}",
                        reader.error_position(),
                        err
                    ));
                    // The reader cannot resynchronise after a syntax error
                    return findings;
                }
            }
        }

        if findings.root.is_none() {
            findings
                .errors
                .push("document has no root element".to_string());
        }
        if let Some(open) = stack.last() {
            findings.errors.push(format!(
                "<{}> is not closed at end of document ({} open element(s))",
                open,
                stack.len()
            ));
        }

        findings
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn on_root(findings: &mut Findings, e: &BytesStart<'_>, name: &str, roots: usize) {
    if roots > 1 {
        findings
            .errors
            .push(format!("second root element <{}>", name));
        return;
    }

    findings.root = Some(name.to_string());
    findings.root_has_namespace = e
        .attributes()
        .flatten()
        .any(|a| a.key.as_ref() == b"xmlns");
}

fn check_attributes(findings: &mut Findings, e: &BytesStart<'_>, element: &str) {
    for attr in e.attributes() {
        match attr {
            Ok(attr) => {
                if let Err(err) = attr.unescape_value() {
                    findings.errors.push(format!(
                        "attribute {} of <{}> has a bad character reference: {}",
                        String::from_utf8_lossy(attr.key.as_ref()),
                        element,
                        err
                    ));
                }
            }
            Err(err) => {
                findings
                    .errors
                    .push(format!("malformed attribute in <{}>: {}", element, err));
                // Later attributes are unreliable once one is malformed
                break;
            }
        }
    }
}
