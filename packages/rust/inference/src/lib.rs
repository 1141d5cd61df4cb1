//! Inference engine: templated objectives with confidence scoring.
//!
//! Used when no official objectives can be extracted for a test. Inference
//! is deterministic, does no I/O and never returns an error: the last
//! strategy always produces objectives, so only a threshold above its
//! confidence can yield an empty set.

use std::sync::Arc;

use objectivedb_shared::reference::TEST_NAME_PLACEHOLDER;
use objectivedb_shared::types::{EVIDENCE_EXCERPT_CHARS, truncate_chars};
use objectivedb_shared::{Objective, ReferenceData, TestInfo, ValidationStatus};

/// Number of teaching standards used by the minimal fallback.
pub const MINIMAL_STANDARDS: usize = 5;

/// Confidence of objectives synthesized from standards text.
pub const SYNTHESIS_CONFIDENCE: f64 = 0.65;

/// Lines must be longer than this to be synthesized.
const SYNTHESIS_MIN_CHARS: usize = 20;

/// Per-source confidence boost and its cap.
const BOOST_PER_SOURCE: f64 = 0.1;
const MAX_BOOST: f64 = 0.3;

const SYNTHESIS_RATIONALE: &str = "Synthesized from state curriculum standards aligned with test";

/// Inference strategies, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Subject area matches a template key exactly.
    SubjectTemplate,
    /// Test name mentions elementary or general teaching.
    TeachingStandards,
    /// Test system is known; generic competencies for that system.
    SystemTemplate,
    /// Nothing usable: first five teaching standards.
    MinimalFallback,
}

impl Strategy {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::SubjectTemplate => 0.75,
            Self::TeachingStandards => 0.70,
            Self::SystemTemplate => 0.60,
            Self::MinimalFallback => 0.40,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubjectTemplate => "subject_template",
            Self::TeachingStandards => "teaching_standards",
            Self::SystemTemplate => "system_template",
            Self::MinimalFallback => "minimal_fallback",
        }
    }
}

/// Produces inferred objectives from shared reference data.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    refs: Arc<ReferenceData>,
}

impl InferenceEngine {
    pub fn new(refs: Arc<ReferenceData>) -> Self {
        Self { refs }
    }

    /// First strategy whose precondition holds for `info`.
    pub fn select_strategy(&self, info: &TestInfo) -> Strategy {
        let subject = info.subject_area.as_deref().unwrap_or("");
        if !subject.is_empty() && self.refs.subject_template(subject).is_some() {
            return Strategy::SubjectTemplate;
        }

        let name = info.name.as_deref().unwrap_or("").to_lowercase();
        if name.contains("elementary") || name.contains("general") {
            return Strategy::TeachingStandards;
        }

        if info.system.as_deref().is_some_and(|s| !s.is_empty()) {
            return Strategy::SystemTemplate;
        }

        Strategy::MinimalFallback
    }

    /// Infer objectives for a test, keeping those with `confidence >= threshold`.
    pub fn infer(&self, info: &TestInfo, threshold: f64) -> Vec<Objective> {
        let strategy = self.select_strategy(info);
        let confidence = strategy.confidence();

        let (texts, rationale, evidence_url) = match strategy {
            Strategy::SubjectTemplate => {
                let subject = info.subject_area.as_deref().unwrap_or("");
                let texts = self
                    .refs
                    .subject_template(subject)
                    .map(|t| t.objectives.clone())
                    .unwrap_or_default();
                (
                    texts,
                    format!(
                        "Inferred from standard {subject} teacher certification competency frameworks"
                    ),
                    None,
                )
            }
            Strategy::TeachingStandards => (
                self.refs.teaching_standards.clone(),
                "Inferred from InTASC Model Core Teaching Standards, applicable to general teaching licenses"
                    .to_string(),
                Some(self.refs.standards_url.clone()),
            ),
            Strategy::SystemTemplate => {
                let system = info.system.as_deref().unwrap_or("");
                let name = info.name.as_deref().unwrap_or("");
                (
                    self.system_objectives(system, name),
                    format!(
                        "Inferred from typical {system} test structure and common teacher competencies"
                    ),
                    None,
                )
            }
            Strategy::MinimalFallback => (
                self.refs
                    .teaching_standards
                    .iter()
                    .take(MINIMAL_STANDARDS)
                    .cloned()
                    .collect(),
                "Minimal inference based on general teaching standards; official objectives not found"
                    .to_string(),
                Some(self.refs.standards_url.clone()),
            ),
        };

        tracing::debug!(
            strategy = strategy.as_str(),
            count = texts.len(),
            confidence,
            "inferred objectives"
        );

        if confidence < threshold {
            return Vec::new();
        }

        texts
            .into_iter()
            .enumerate()
            .map(|(idx, text)| {
                Objective::inferred(idx as u32, text, confidence, rationale.clone())
                    .with_evidence_url(evidence_url.clone())
            })
            .collect()
    }

    /// Generic competencies for a test system, plus the first matching system extra.
    fn system_objectives(&self, system: &str, test_name: &str) -> Vec<String> {
        let mut objectives: Vec<String> = self
            .refs
            .generic_competencies
            .iter()
            .map(|c| c.replace(TEST_NAME_PLACEHOLDER, test_name))
            .collect();

        let system_lower = system.to_lowercase();
        if let Some(extra) = self
            .refs
            .system_extras
            .iter()
            .find(|e| system_lower.contains(&e.system_contains.to_lowercase()))
        {
            objectives.push(extra.objective.clone());
        }
        objectives
    }

    /// Boost inferred objectives by `min(0.1 × n, 0.3)` for `n` supporting sources.
    ///
    /// The boost is additive per call, so calling twice with overlapping
    /// evidence boosts twice. Callers should invoke it once per objective set.
    pub fn enhance_confidence(&self, objectives: &mut [Objective], supporting_urls: &[String]) {
        if supporting_urls.is_empty() {
            return;
        }
        let n = supporting_urls.len();
        let boost = (n as f64 * BOOST_PER_SOURCE).min(MAX_BOOST);

        for objective in objectives.iter_mut().filter(|o| o.is_inferred) {
            objective.confidence = (objective.confidence + boost).min(1.0);
            let suffix = format!(" | Supported by {n} additional source(s)");
            match objective.rationale.as_mut() {
                Some(rationale) => rationale.push_str(&suffix),
                None => objective.rationale = Some(suffix.trim_start_matches(" | ").to_string()),
            }
        }
    }

    /// Turn standards-like lines of `raw_text` into partial inferred objectives.
    pub fn synthesize_from_standards(&self, raw_text: &str, info: &TestInfo) -> Vec<Objective> {
        raw_text
            .lines()
            .map(str::trim)
            .filter(|line| line.chars().count() > SYNTHESIS_MIN_CHARS)
            .filter(|line| {
                let lower = line.to_lowercase();
                self.refs
                    .synthesis_verbs
                    .iter()
                    .any(|v| lower.contains(v.as_str()))
            })
            .enumerate()
            .map(|(idx, line)| Objective {
                index: idx as u32,
                text: line.to_string(),
                evidence_excerpt: Some(truncate_chars(line, EVIDENCE_EXCERPT_CHARS)),
                evidence_url: info.source_url.clone(),
                is_inferred: true,
                confidence: SYNTHESIS_CONFIDENCE,
                rationale: Some(SYNTHESIS_RATIONALE.to_string()),
                validation_status: ValidationStatus::Partial,
                validator_notes: None,
            })
            .collect()
    }
}
