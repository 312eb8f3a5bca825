//! Container validation and auto-repair.
//!
//! Two interchangeable backends sit behind [`Backend`]:
//! - `strict`: a full structural parse (quick-xml), authoritative
//! - `heuristic`: root element presence and its matching close tag
//!
//! [`Validator::validate`] runs the bounded state machine
//! `Parsing -> Valid` or `Parsing -> Fixing -> Parsing ...` up to the
//! configured number of fix attempts. A repaired document is only ever
//! returned after it re-validated with the same backend.

pub mod autofix;
mod heuristic;
#[cfg(feature = "strict-xml")]
mod strict;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

pub use autofix::{auto_fix, auto_fix_with_report, FixOutcome, Repair};
pub use heuristic::HeuristicBackend;
#[cfg(feature = "strict-xml")]
pub use strict::StrictBackend;

use crate::config::{BackendChoice, ValidatorSettings};
use crate::container::{ROOT_ELEMENT, SVG_NS};
use crate::error::{BundleError, Result};

/// Which backend produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Strict,
    Heuristic,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Strict => write!(f, "strict"),
            BackendKind::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Raw output of one backend pass
#[derive(Debug, Clone, Default)]
pub struct Findings {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,

    /// Name of the root element, when one was found
    pub root: Option<String>,

    /// Whether the root start tag declares a default namespace
    pub root_has_namespace: bool,
}

impl Findings {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A well-formedness checker
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Check one document; never mutates anything
    fn check(&self, doc: &str) -> Findings;
}

/// Outcome of validating one document
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub was_auto_fixed: bool,
    pub backend: BackendKind,

    /// Repairs applied to reach the accepted document
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repairs: Vec<Repair>,

    /// The repaired document, set only when `was_auto_fixed`
    #[serde(skip)]
    pub fixed_document: Option<String>,
}

impl ValidationResult {
    /// The document that passed: the repaired one, or `original` itself
    pub fn accepted<'a>(&'a self, original: &'a str) -> Option<&'a str> {
        if !self.valid {
            return None;
        }
        Some(self.fixed_document.as_deref().unwrap_or(original))
    }
}

/// Validation state machine phases
enum Phase {
    Parsing {
        doc: String,
        attempt: u32,
        repairs: Vec<Repair>,
    },
    Fixing {
        doc: String,
        attempt: u32,
        repairs: Vec<Repair>,
    },
    Valid {
        doc: String,
        findings: Findings,
        repairs: Vec<Repair>,
    },
    Unfixable,
}

/// Validator bound to one backend
#[derive(Clone)]
pub struct Validator {
    backend: Arc<dyn Backend>,
    max_fix_attempts: u32,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("backend", &self.backend.kind())
            .field("max_fix_attempts", &self.max_fix_attempts)
            .finish()
    }
}

impl Validator {
    /// Pick the backend from configuration and what this build carries.
    ///
    /// Asking for `strict` in a build without the `strict-xml` feature is a
    /// configuration error; `auto` silently degrades to the heuristic.
    pub fn new(settings: &ValidatorSettings) -> Result<Self> {
        let backend: Arc<dyn Backend> = match settings.backend {
            BackendChoice::Heuristic => Arc::new(HeuristicBackend),
            BackendChoice::Strict => strict_backend().ok_or_else(|| {
                BundleError::Config(
                    "strict validator requested but this build lacks the strict-xml feature"
                        .to_string(),
                )
            })?,
            BackendChoice::Auto => strict_backend().unwrap_or_else(|| {
                warn!("Strict validator unavailable, using heuristic backend");
                Arc::new(HeuristicBackend)
            }),
        };

        Ok(Self::with_backend(backend, settings.max_fix_attempts))
    }

    pub fn with_backend(backend: Arc<dyn Backend>, max_fix_attempts: u32) -> Self {
        Self {
            backend,
            max_fix_attempts,
        }
    }

    /// Heuristic validator with default settings
    pub fn heuristic() -> Self {
        Self::with_backend(
            Arc::new(HeuristicBackend),
            crate::config::DEFAULT_MAX_FIX_ATTEMPTS,
        )
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Check without attempting any repair
    pub fn check(&self, doc: &str) -> ValidationResult {
        let findings = self.run_backend(doc);
        self.result(findings, false, Vec::new(), None)
    }

    /// Check, repairing known defects when the first pass fails
    #[instrument(skip(self, doc), fields(backend = %self.backend.kind(), len = doc.len()))]
    pub fn validate(&self, doc: &str) -> ValidationResult {
        let initial = self.run_backend(doc);
        if initial.is_valid() {
            return self.result(initial, false, Vec::new(), None);
        }

        let mut phase = Phase::Fixing {
            doc: doc.to_string(),
            attempt: 0,
            repairs: Vec::new(),
        };

        loop {
            phase = match phase {
                Phase::Fixing {
                    doc,
                    attempt,
                    mut repairs,
                } => {
                    if attempt >= self.max_fix_attempts {
                        Phase::Unfixable
                    } else {
                        let outcome = auto_fix_with_report(&doc);
                        if outcome.changed() {
                            debug!(attempt = attempt + 1, repairs = ?outcome.repairs, "Applied repairs");
                            for repair in outcome.repairs {
                                if !repairs.contains(&repair) {
                                    repairs.push(repair);
                                }
                            }
                            Phase::Parsing {
                                doc: outcome.document,
                                attempt: attempt + 1,
                                repairs,
                            }
                        } else {
                            Phase::Unfixable
                        }
                    }
                }
                Phase::Parsing {
                    doc,
                    attempt,
                    repairs,
                } => {
                    let findings = self.run_backend(&doc);
                    if findings.is_valid() {
                        Phase::Valid {
                            doc,
                            findings,
                            repairs,
                        }
                    } else {
                        Phase::Fixing {
                            doc,
                            attempt,
                            repairs,
                        }
                    }
                }
                Phase::Valid {
                    doc: fixed,
                    findings,
                    repairs,
                } => {
                    return self.result(findings, true, repairs, Some(fixed));
                }
                Phase::Unfixable => {
                    debug!(errors = initial.errors.len(), "Document could not be repaired");
                    return self.result(initial, false, Vec::new(), None);
                }
            };
        }
    }

    fn run_backend(&self, doc: &str) -> Findings {
        let mut findings = self.backend.check(doc);
        container_warnings(&mut findings, doc);
        findings
    }

    fn result(
        &self,
        findings: Findings,
        was_auto_fixed: bool,
        repairs: Vec<Repair>,
        fixed_document: Option<String>,
    ) -> ValidationResult {
        ValidationResult {
            valid: findings.is_valid(),
            errors: findings.errors,
            warnings: findings.warnings,
            was_auto_fixed,
            backend: self.backend.kind(),
            repairs,
            fixed_document,
        }
    }
}

#[cfg(feature = "strict-xml")]
fn strict_backend() -> Option<Arc<dyn Backend>> {
    Some(Arc::new(StrictBackend))
}

#[cfg(not(feature = "strict-xml"))]
fn strict_backend() -> Option<Arc<dyn Backend>> {
    None
}

/// Container-level expectations that do not affect well-formedness
fn container_warnings(findings: &mut Findings, doc: &str) {
    let Some(root) = findings.root.as_deref() else {
        return;
    };

    if root != ROOT_ELEMENT {
        findings
            .warnings
            .push(format!("root element is <{}>, expected <{}>", root, ROOT_ELEMENT));
    }
    if !findings.root_has_namespace {
        findings
            .warnings
            .push("root element has no namespace declaration".to_string());
    } else if root == ROOT_ELEMENT && !doc.contains(SVG_NS) {
        findings
            .warnings
            .push(format!("root namespace is not {}", SVG_NS));
    }
    if !doc.contains("<metadata") {
        findings
            .warnings
            .push("document has no metadata block".to_string());
    }
}
