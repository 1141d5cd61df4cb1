//! Core domain types for the objectives database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ObjectiveDbError, Result};

/// Maximum length of an evidence excerpt, in characters.
pub const EVIDENCE_EXCERPT_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// AuditId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for audit run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(pub Uuid);

impl AuditId {
    /// Generate a new time-sortable audit identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AuditId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ProcessingUnit
// ---------------------------------------------------------------------------

/// A jurisdiction processed through the pipeline (e.g. a U.S. state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingUnit {
    /// Full name, unique.
    pub name: String,
    /// Short code (e.g. `CA`), unique.
    pub short_code: String,
}

impl ProcessingUnit {
    /// Build a unit, rejecting blank names or codes.
    pub fn new(name: impl Into<String>, short_code: impl Into<String>) -> Result<Self> {
        let name = name.into().trim().to_string();
        let short_code = short_code.into().trim().to_string();
        if name.is_empty() {
            return Err(ObjectiveDbError::validation("processing unit name is empty"));
        }
        if short_code.is_empty() {
            return Err(ObjectiveDbError::validation(format!(
                "processing unit '{name}' has an empty short code"
            )));
        }
        Ok(Self { name, short_code })
    }

    /// File-name friendly form of the unit name (`New York` → `New_York`).
    pub fn file_stem(&self) -> String {
        self.name.replace(' ', "_")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// A certification test as discovered (or synthesized), before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCandidate {
    /// Test system (Praxis, NES, edTPA, a state exam...).
    pub system: String,
    /// Test name.
    pub name: String,
    /// Test code/number, if the system uses one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Subject area, used to pick an inference template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_area: Option<String>,
    /// Grade band (K-6, 7-12, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_band: Option<String>,
    /// Test provider (ETS, Pearson, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Page the test was found on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Last-updated marker reported by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_updated: Option<String>,
    /// Sample of the listing content the test was extracted from. Not persisted.
    #[serde(skip)]
    pub content_sample: Option<String>,
}

impl TestCandidate {
    /// Create a candidate with only its identity fields set.
    pub fn new(system: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            name: name.into(),
            code: None,
            subject_area: None,
            grade_band: None,
            provider: None,
            source_url: None,
            source_updated: None,
            content_sample: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject_area = Some(subject.into());
        self
    }

    pub fn with_grade_band(mut self, band: impl Into<String>) -> Self {
        self.grade_band = Some(band.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Deduplication key `(system, name, code)`; a missing code is `""`.
    pub fn dedup_key(&self) -> (&str, &str, &str) {
        (
            self.system.as_str(),
            self.name.as_str(),
            self.code.as_deref().unwrap_or(""),
        )
    }

    /// Project the metadata the inference engine needs.
    pub fn to_test_info(&self) -> TestInfo {
        TestInfo {
            name: Some(self.name.clone()),
            system: Some(self.system.clone()),
            subject_area: self.subject_area.clone(),
            source_url: self.source_url.clone(),
        }
    }
}

/// A persisted test row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTest {
    /// Test identifier (UUID v7).
    pub id: String,
    /// Owning processing unit.
    pub unit_id: String,
    /// Test metadata.
    #[serde(flatten)]
    pub test: TestCandidate,
    /// When the test was last (re)discovered.
    pub discovered_at: DateTime<Utc>,
}

/// Inference input. Every field is optional; `TestInfo::default()` is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub subject_area: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Objectives
// ---------------------------------------------------------------------------

/// Provenance/quality status of an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Verified,
    Partial,
    Inferred,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Partial => "partial",
            Self::Inferred => "inferred",
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ValidationStatus {
    type Err = ObjectiveDbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "verified" => Ok(Self::Verified),
            "partial" => Ok(Self::Partial),
            "inferred" => Ok(Self::Inferred),
            other => Err(ObjectiveDbError::parse(format!(
                "unknown validation status: {other}"
            ))),
        }
    }
}

/// A single competency statement attached to a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    /// Zero-based position within the test.
    pub index: u32,
    /// Objective text.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_url: Option<String>,
    /// `true` when produced by inference rather than read from a source.
    pub is_inferred: bool,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Why an inferred objective was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub validation_status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_notes: Option<String>,
}

impl Objective {
    /// An objective read verbatim from an authoritative source.
    pub fn verified(index: u32, text: impl Into<String>, evidence_url: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            index,
            evidence_excerpt: Some(truncate_chars(&text, EVIDENCE_EXCERPT_CHARS)),
            text,
            evidence_url: Some(evidence_url.into()),
            is_inferred: false,
            confidence: 1.0,
            rationale: None,
            validation_status: ValidationStatus::Verified,
            validator_notes: None,
        }
    }

    /// An objective produced by an inference strategy.
    pub fn inferred(
        index: u32,
        text: impl Into<String>,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            index,
            text: text.into(),
            evidence_excerpt: None,
            evidence_url: None,
            is_inferred: true,
            confidence,
            rationale: Some(rationale.into()),
            validation_status: ValidationStatus::Inferred,
            validator_notes: None,
        }
    }

    pub fn with_evidence_url(mut self, url: Option<String>) -> Self {
        self.evidence_url = url;
        self
    }
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Audits
// ---------------------------------------------------------------------------

/// Lifecycle status of one unit's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Running,
    Complete,
    Partial,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Only `running → {complete, partial, error}` is legal.
    pub fn can_transition_to(&self, next: AuditStatus) -> bool {
        *self == Self::Running && next.is_terminal()
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditStatus {
    type Err = ObjectiveDbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "complete" => Ok(Self::Complete),
            "partial" => Ok(Self::Partial),
            "error" => Ok(Self::Error),
            other => Err(ObjectiveDbError::parse(format!("unknown audit status: {other}"))),
        }
    }
}

/// Per-run tallies recorded on the audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCounts {
    pub tests_found: u32,
    /// Accepted non-inferred objectives.
    pub objectives_found: u32,
    /// Accepted inferred objectives.
    pub objectives_inferred: u32,
    pub queries_run: u32,
}

impl AuditCounts {
    pub fn total_objectives(&self) -> u32 {
        self.objectives_found + self.objectives_inferred
    }
}

/// One audit row: the record of a single unit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditId,
    pub unit_id: String,
    pub status: AuditStatus,
    pub counts: AuditCounts,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_id_roundtrip() {
        let id = AuditId::new();
        let parsed: AuditId = id.to_string().parse().expect("parse AuditId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn unit_rejects_blank_fields() {
        assert!(ProcessingUnit::new("", "CA").is_err());
        assert!(ProcessingUnit::new("California", "  ").is_err());
        let unit = ProcessingUnit::new(" New York ", "NY").unwrap();
        assert_eq!(unit.name, "New York");
        assert_eq!(unit.file_stem(), "New_York");
    }

    #[test]
    fn dedup_key_treats_missing_code_as_empty() {
        let test = TestCandidate::new("edTPA", "edTPA");
        assert_eq!(test.dedup_key(), ("edTPA", "edTPA", ""));
        let coded = TestCandidate::new("Praxis", "Elementary Education").with_code("5001");
        assert_eq!(coded.dedup_key(), ("Praxis", "Elementary Education", "5001"));
    }

    #[test]
    fn verified_objective_carries_excerpt() {
        let long = "Demonstrate ".repeat(40);
        let obj = Objective::verified(3, long.clone(), "https://www.ets.org/praxis");
        assert_eq!(obj.index, 3);
        assert!(!obj.is_inferred);
        assert_eq!(obj.confidence, 1.0);
        assert_eq!(obj.validation_status, ValidationStatus::Verified);
        assert_eq!(obj.evidence_excerpt.unwrap().chars().count(), EVIDENCE_EXCERPT_CHARS);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("•••••", 2), "••");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn audit_transitions_are_one_shot() {
        assert!(AuditStatus::Running.can_transition_to(AuditStatus::Complete));
        assert!(AuditStatus::Running.can_transition_to(AuditStatus::Error));
        assert!(!AuditStatus::Running.can_transition_to(AuditStatus::Running));
        assert!(!AuditStatus::Complete.can_transition_to(AuditStatus::Error));
        assert!(!AuditStatus::Error.can_transition_to(AuditStatus::Partial));
    }

    #[test]
    fn status_strings_roundtrip() {
        for status in [
            ValidationStatus::Verified,
            ValidationStatus::Partial,
            ValidationStatus::Inferred,
        ] {
            assert_eq!(status.as_str().parse::<ValidationStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<AuditStatus>().is_err());
        let json = serde_json::to_string(&AuditStatus::Partial).unwrap();
        assert_eq!(json, r#""partial""#);
    }
}
