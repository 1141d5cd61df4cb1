//! Validation gate for discovered tests and candidate objectives.
//!
//! Every check is pure and returns a [`Verdict`]; a rejection is a value,
//! never an error. The vocabularies come from [`ReferenceData`].

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use objectivedb_shared::{Objective, ReferenceData, TestCandidate, ValidationStatus};

/// Minimum word count for an objective.
pub const MIN_OBJECTIVE_WORDS: usize = 6;

/// Minimum character length for a test name.
pub const MIN_TEST_NAME_CHARS: usize = 3;

/// Confidence at which an inferred objective counts as `partial`.
pub const PARTIAL_CONFIDENCE: f64 = 0.7;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Outcome of a check: accepted iff there are no issues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub issues: Vec<String>,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues joined for storage in `validator_notes`.
    pub fn notes(&self) -> Option<String> {
        if self.issues.is_empty() {
            None
        } else {
            Some(self.issues.join("; "))
        }
    }
}

/// Aggregate quality figures for one objective set. Reporting only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SetMetrics {
    pub total: usize,
    pub valid: usize,
    pub issues_found: usize,
    pub avg_confidence: f64,
    pub inferred_count: usize,
    pub verified_count: usize,
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Validation gate over shared reference data.
#[derive(Debug, Clone)]
pub struct ValidationGate {
    refs: Arc<ReferenceData>,
}

impl ValidationGate {
    pub fn new(refs: Arc<ReferenceData>) -> Self {
        Self { refs }
    }

    /// Structural checks on a test before it is persisted.
    pub fn validate_test(&self, test: &TestCandidate) -> Verdict {
        let mut issues = Vec::new();

        if test.name.trim().is_empty() {
            issues.push("Missing required field: test_name".to_string());
        }
        if test.system.trim().is_empty() {
            issues.push("Missing required field: test_system".to_string());
        }
        if test.source_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
            issues.push("Missing required field: official_source_url".to_string());
        }

        let name_len = test.name.chars().count();
        if name_len > 0 && name_len < MIN_TEST_NAME_CHARS {
            issues.push("Test name too short".to_string());
        }

        if let Some(provider) = test.provider.as_deref().filter(|p| !p.is_empty()) {
            if !self.refs.is_recognized_provider(provider) {
                issues.push(format!("Unrecognized provider: {provider}"));
            }
        }

        Verdict { issues }
    }

    /// Quality checks on a single objective.
    pub fn validate_objective(&self, objective: &Objective) -> Verdict {
        let mut issues = Vec::new();
        let text = objective.text.as_str();
        let lower = text.to_lowercase();

        let words = text.split_whitespace().count();
        if words < MIN_OBJECTIVE_WORDS {
            issues.push(format!(
                "Objective too short ({words} words, minimum {MIN_OBJECTIVE_WORDS})"
            ));
        }

        // Substring match: "uses" and "understanding" both count.
        if !self.refs.objective_verbs.iter().any(|v| lower.contains(v.as_str())) {
            issues.push("No clear action verb found".to_string());
        }

        if self
            .refs
            .boilerplate_phrases
            .iter()
            .any(|p| lower.contains(p.as_str()))
        {
            issues.push("Contains boilerplate/navigation text".to_string());
        }

        if objective.is_inferred {
            if !(0.0..=1.0).contains(&objective.confidence) {
                issues.push(format!("Invalid confidence score: {}", objective.confidence));
            }
            if objective.rationale.as_deref().is_none_or(|r| r.trim().is_empty()) {
                issues.push("Inferred objective missing rationale".to_string());
            }
        }

        Verdict { issues }
    }

    /// Summary metrics over a whole objective set.
    pub fn set_metrics(&self, objectives: &[Objective]) -> SetMetrics {
        let mut metrics = SetMetrics {
            total: objectives.len(),
            ..SetMetrics::default()
        };
        if objectives.is_empty() {
            return metrics;
        }

        let mut confidence_sum = 0.0;
        for objective in objectives {
            let verdict = self.validate_objective(objective);
            if verdict.is_accepted() {
                metrics.valid += 1;
            } else {
                metrics.issues_found += verdict.issues.len();
            }

            if objective.is_inferred {
                metrics.inferred_count += 1;
            } else {
                metrics.verified_count += 1;
            }
            confidence_sum += objective.confidence;
        }
        metrics.avg_confidence = confidence_sum / objectives.len() as f64;

        metrics
    }

    /// Strip navigation phrases and copyright tails, then collapse whitespace.
    pub fn remove_boilerplate(&self, text: &str) -> String {
        let mut text = text.to_string();
        if let Some(re) = &self.refs.navigation_regex {
            text = re.replace_all(&text, "").into_owned();
        }
        if let Some(re) = &self.refs.copyright_regex {
            text = re.replace_all(&text, "").into_owned();
        }
        collapse_whitespace(&text)
    }
}

/// Status implied by provenance and confidence.
pub fn assign_status(objective: &Objective) -> ValidationStatus {
    if objective.is_inferred {
        if objective.confidence >= PARTIAL_CONFIDENCE {
            ValidationStatus::Partial
        } else {
            ValidationStatus::Inferred
        }
    } else if objective.evidence_url.as_deref().is_some_and(|u| !u.is_empty()) {
        ValidationStatus::Verified
    } else {
        ValidationStatus::Partial
    }
}

// ---------------------------------------------------------------------------
// Boilerplate
// ---------------------------------------------------------------------------

fn collapse_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
    WS_RE.replace_all(text, " ").trim().to_string()
}
