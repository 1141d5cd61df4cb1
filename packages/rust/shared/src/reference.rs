//! Immutable reference data: inference templates, validation vocabularies,
//! authority allow-list and provider test patterns.
//!
//! Built once at startup (built-in defaults, optionally overridden from a
//! TOML file) and handed to the pipeline components behind an `Arc`.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ObjectiveDbError, Result};

/// Minimum number of teaching standards; the minimal fallback uses the first five.
pub const MIN_TEACHING_STANDARDS: usize = 5;

/// Placeholder replaced by the test name in the first generic competency.
pub const TEST_NAME_PLACEHOLDER: &str = "{test_name}";

/// Ordered objective list for one subject area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectTemplate {
    pub subject: String,
    pub objectives: Vec<String>,
}

/// Extra generic competency appended when the test system contains `system_contains`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemExtra {
    pub system_contains: String,
    pub objective: String,
}

/// Uncompiled provider pattern, as written in a reference file.
///
/// Capture group 1 (if any) is the test code, group 2 (if any) the title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPatternSpec {
    pub system: String,
    pub provider: String,
    pub pattern: String,
}

/// A compiled provider test pattern.
#[derive(Debug, Clone)]
pub struct TestPattern {
    pub system: String,
    pub provider: String,
    pub regex: Regex,
}

/// On-disk form of the reference data. Any omitted table keeps its built-in value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSource {
    pub subject_templates: Vec<SubjectTemplate>,
    pub teaching_standards: Vec<String>,
    pub standards_url: String,
    pub generic_competencies: Vec<String>,
    pub system_extras: Vec<SystemExtra>,
    pub objective_verbs: Vec<String>,
    pub extraction_verbs: Vec<String>,
    pub synthesis_verbs: Vec<String>,
    pub boilerplate_phrases: Vec<String>,
    pub copyright_markers: Vec<String>,
    pub authoritative_patterns: Vec<String>,
    pub recognized_providers: Vec<String>,
    pub test_patterns: Vec<TestPatternSpec>,
}

/// Validated, compiled reference data.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub subject_templates: Vec<SubjectTemplate>,
    pub teaching_standards: Vec<String>,
    pub standards_url: String,
    pub generic_competencies: Vec<String>,
    pub system_extras: Vec<SystemExtra>,
    /// Action verbs accepted by the validation gate.
    pub objective_verbs: Vec<String>,
    /// Action verbs that mark a fetched line as an objective.
    pub extraction_verbs: Vec<String>,
    /// Keywords that mark a standards line for synthesis.
    pub synthesis_verbs: Vec<String>,
    pub boilerplate_phrases: Vec<String>,
    /// Markers that start a copyright tail, cut to end of line when cleaning.
    pub copyright_markers: Vec<String>,
    /// Boilerplate phrases that are not copyright markers, removed in place.
    pub navigation_regex: Option<Regex>,
    /// Any copyright marker through end of line.
    pub copyright_regex: Option<Regex>,
    pub authoritative_patterns: Vec<String>,
    pub recognized_providers: Vec<String>,
    pub test_patterns: Vec<TestPattern>,
}

impl ReferenceData {
    /// Validate and compile a reference source.
    pub fn from_source(source: ReferenceSource) -> Result<Self> {
        if source.teaching_standards.len() < MIN_TEACHING_STANDARDS {
            return Err(ObjectiveDbError::validation(format!(
                "reference data needs at least {MIN_TEACHING_STANDARDS} teaching standards, found {}",
                source.teaching_standards.len()
            )));
        }
        if source.generic_competencies.is_empty() {
            return Err(ObjectiveDbError::validation(
                "reference data has no generic competencies",
            ));
        }
        if let Some(empty) = source
            .subject_templates
            .iter()
            .find(|t| t.objectives.is_empty())
        {
            return Err(ObjectiveDbError::validation(format!(
                "subject template '{}' has no objectives",
                empty.subject
            )));
        }

        let test_patterns = source
            .test_patterns
            .into_iter()
            .map(|spec| {
                let regex = Regex::new(&spec.pattern).map_err(|e| {
                    ObjectiveDbError::validation(format!(
                        "invalid test pattern for {}: {e}",
                        spec.system
                    ))
                })?;
                Ok(TestPattern {
                    system: spec.system,
                    provider: spec.provider,
                    regex,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let boilerplate_phrases = lowercase_all(source.boilerplate_phrases);
        let copyright_markers = lowercase_all(source.copyright_markers);
        let navigation: Vec<&String> = boilerplate_phrases
            .iter()
            .filter(|p| !copyright_markers.contains(p))
            .collect();
        let navigation_regex = phrase_regex(&navigation, "")?;
        let copyright_regex = phrase_regex(&copyright_markers.iter().collect::<Vec<_>>(), ".*")?;

        Ok(Self {
            subject_templates: source.subject_templates,
            teaching_standards: source.teaching_standards,
            standards_url: source.standards_url,
            generic_competencies: source.generic_competencies,
            system_extras: source.system_extras,
            objective_verbs: lowercase_all(source.objective_verbs),
            extraction_verbs: lowercase_all(source.extraction_verbs),
            synthesis_verbs: lowercase_all(source.synthesis_verbs),
            boilerplate_phrases,
            copyright_markers,
            navigation_regex,
            copyright_regex,
            authoritative_patterns: lowercase_all(source.authoritative_patterns),
            recognized_providers: source.recognized_providers,
            test_patterns,
        })
    }

    /// Parse reference data from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let source: ReferenceSource = toml::from_str(content)
            .map_err(|e| ObjectiveDbError::config(format!("invalid reference data: {e}")))?;
        Self::from_source(source)
    }

    /// Load reference data from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ObjectiveDbError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Template for an exact subject-area match.
    pub fn subject_template(&self, subject: &str) -> Option<&SubjectTemplate> {
        self.subject_templates.iter().find(|t| t.subject == subject)
    }

    /// Whether `provider` is in the recognized provider list (exact match).
    pub fn is_recognized_provider(&self, provider: &str) -> bool {
        self.recognized_providers.iter().any(|p| p == provider)
    }
}

impl Default for ReferenceData {
    fn default() -> Self {
        Self::from_source(ReferenceSource::default()).expect("built-in reference data is valid")
    }
}

/// Case-insensitive alternation of literal phrases followed by `suffix`.
/// `None` when there are no phrases.
fn phrase_regex(phrases: &[&String], suffix: &str) -> Result<Option<Regex>> {
    if phrases.is_empty() {
        return Ok(None);
    }
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i)({alternation}){suffix}"))
        .map(Some)
        .map_err(|e| ObjectiveDbError::validation(format!("invalid boilerplate phrase list: {e}")))
}

fn lowercase_all(items: Vec<String>) -> Vec<String> {
    items.into_iter().map(|s| s.to_lowercase()).collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn template(subject: &str, objectives: &[&str]) -> SubjectTemplate {
    SubjectTemplate {
        subject: subject.to_string(),
        objectives: strings(objectives),
    }
}

// ---------------------------------------------------------------------------
// Built-in tables
// ---------------------------------------------------------------------------

impl Default for ReferenceSource {
    fn default() -> Self {
        Self {
            subject_templates: vec![
                template(
                    "Elementary Education",
                    &[
                        "Demonstrate knowledge of child development and learning theory",
                        "Apply effective instructional strategies for diverse learners",
                        "Integrate literacy instruction across content areas",
                        "Use formative and summative assessment to guide instruction",
                        "Create inclusive and culturally responsive classroom environments",
                        "Understand and teach mathematics concepts and problem-solving",
                        "Implement science inquiry and investigation methods",
                        "Teach social studies content and citizenship concepts",
                        "Develop students' critical thinking and communication skills",
                    ],
                ),
                template(
                    "Mathematics",
                    &[
                        "Demonstrate deep understanding of mathematical concepts and procedures",
                        "Apply mathematical reasoning and problem-solving strategies",
                        "Connect mathematics to real-world applications and other disciplines",
                        "Use technology to enhance mathematical learning",
                        "Assess student understanding of mathematical concepts",
                        "Differentiate instruction for diverse mathematical learners",
                        "Teach number sense, operations, and algebraic thinking",
                        "Develop geometric and spatial reasoning in students",
                        "Apply statistical and probabilistic reasoning",
                    ],
                ),
                template(
                    "English Language Arts",
                    &[
                        "Demonstrate knowledge of reading processes and comprehension strategies",
                        "Teach writing processes and composition across genres",
                        "Develop students' speaking and listening skills",
                        "Analyze and teach literary and informational texts",
                        "Apply linguistics and language development principles",
                        "Integrate technology and media literacy instruction",
                        "Assess and support literacy development",
                        "Differentiate instruction for diverse language learners",
                    ],
                ),
                template(
                    "Science",
                    &[
                        "Apply scientific inquiry and investigation methods",
                        "Demonstrate content knowledge in physical sciences",
                        "Demonstrate content knowledge in life sciences",
                        "Demonstrate content knowledge in earth and space sciences",
                        "Use technology and laboratory equipment safely and effectively",
                        "Connect science concepts across disciplines",
                        "Develop students' scientific reasoning and critical thinking",
                        "Assess student understanding of scientific concepts",
                    ],
                ),
                template(
                    "Social Studies",
                    &[
                        "Teach historical thinking and chronological reasoning",
                        "Develop students' geographic literacy and spatial thinking",
                        "Apply civic knowledge and promote civic engagement",
                        "Teach economic concepts and financial literacy",
                        "Integrate primary and secondary source analysis",
                        "Promote cultural awareness and global perspectives",
                        "Use inquiry-based approaches to social studies instruction",
                    ],
                ),
                template(
                    "Special Education",
                    &[
                        "Understand characteristics of students with disabilities",
                        "Apply individualized education program (IEP) development and implementation",
                        "Use evidence-based instructional strategies for diverse learners",
                        "Implement positive behavior supports and interventions",
                        "Collaborate with families, educators, and service providers",
                        "Apply assessment for eligibility, progress monitoring, and instruction",
                        "Ensure access to general education curriculum",
                        "Understand legal and ethical responsibilities in special education",
                    ],
                ),
            ],
            teaching_standards: strings(&[
                "Learner Development: Understands how learners grow and develop",
                "Learning Differences: Uses understanding of individual differences and diverse cultures",
                "Learning Environments: Works with others to create environments that support learning",
                "Content Knowledge: Understands the central concepts and tools of inquiry",
                "Application of Content: Connects concepts using differing perspectives",
                "Assessment: Understands and uses multiple methods of assessment",
                "Planning for Instruction: Plans instruction that supports every student",
                "Instructional Strategies: Understands and uses a variety of instructional strategies",
                "Professional Learning: Engages in ongoing professional learning",
                "Leadership and Collaboration: Seeks leadership roles and collaborates",
            ]),
            standards_url: "https://ccsso.org/intasc".into(),
            generic_competencies: strings(&[
                "Demonstrate content knowledge in {test_name}",
                "Apply pedagogical principles and instructional strategies",
                "Assess and evaluate student learning and progress",
                "Create inclusive and equitable learning environments",
                "Integrate technology and resources to enhance learning",
                "Collaborate with colleagues, families, and communities",
                "Engage in professional growth and ethical practice",
            ]),
            system_extras: vec![
                SystemExtra {
                    system_contains: "praxis".into(),
                    objective: "Apply Educational Testing Service (ETS) standards for teacher readiness".into(),
                },
                SystemExtra {
                    system_contains: "nes".into(),
                    objective: "Meet state-specific educator preparation standards".into(),
                },
            ],
            objective_verbs: strings(&[
                "understand",
                "demonstrate",
                "apply",
                "analyze",
                "evaluate",
                "identify",
                "explain",
                "describe",
                "compare",
                "create",
                "develop",
                "design",
                "implement",
                "use",
                "integrate",
                "teach",
                "assess",
                "plan",
                "collaborate",
                "communicate",
            ]),
            extraction_verbs: strings(&[
                "understand",
                "demonstrate",
                "apply",
                "analyze",
                "evaluate",
                "identify",
                "explain",
                "describe",
                "compare",
                "create",
                "develop",
                "design",
                "implement",
                "use",
                "integrate",
            ]),
            synthesis_verbs: strings(&["understand", "demonstrate", "apply"]),
            boilerplate_phrases: strings(&[
                "click here",
                "read more",
                "download",
                "next page",
                "table of contents",
                "copyright",
                "all rights reserved",
            ]),
            copyright_markers: strings(&["copyright", "©", "all rights reserved"]),
            authoritative_patterns: strings(&[
                ".gov",
                ".edu",
                "ets.org",
                "pearson.com",
                "nesinc.com",
                "edtpa.com",
                "act.org",
                "state.",
                "doe.",
                "education.",
            ]),
            recognized_providers: strings(&["ETS", "Pearson", "State DOE", "edTPA", "NES", "Unknown"]),
            test_patterns: vec![
                TestPatternSpec {
                    system: "Praxis".into(),
                    provider: "ETS".into(),
                    pattern: r"(?i)\bPraxis\s+(\d+)(?:\s*[:\-–]\s*([^\n:;()|.,]{3,80}))?".into(),
                },
                TestPatternSpec {
                    system: "NES".into(),
                    provider: "Pearson".into(),
                    pattern: r"(?i)\bNES\s+(\d+)(?:\s*[:\-–]\s*([^\n:;()|.,]{3,80}))?".into(),
                },
                TestPatternSpec {
                    system: "edTPA".into(),
                    provider: "Pearson".into(),
                    pattern: r"(?i)\bedTPA\b".into(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_are_valid() {
        let refs = ReferenceData::default();
        assert_eq!(refs.teaching_standards.len(), 10);
        assert_eq!(refs.subject_templates.len(), 6);
        assert_eq!(refs.objective_verbs.len(), 20);
        assert_eq!(refs.extraction_verbs.len(), 15);
        assert_eq!(refs.test_patterns.len(), 3);
        assert_eq!(refs.subject_template("Mathematics").unwrap().objectives.len(), 9);
        assert!(refs.subject_template("mathematics").is_none());
        assert!(refs.is_recognized_provider("State DOE"));
        assert!(!refs.is_recognized_provider("ets"));
    }

    #[test]
    fn partial_override_keeps_other_tables() {
        let toml = r#"
synthesis_verbs = ["Explain"]
recognized_providers = ["ETS"]
"#;
        let refs = ReferenceData::from_toml_str(toml).expect("parse override");
        assert_eq!(refs.synthesis_verbs, vec!["explain"]);
        assert_eq!(refs.recognized_providers, vec!["ETS"]);
        assert_eq!(refs.teaching_standards.len(), 10);
    }

    #[test]
    fn too_few_standards_rejected() {
        let toml = r#"teaching_standards = ["One standard here", "Two"]"#;
        let err = ReferenceData::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("at least 5"));
    }

    #[test]
    fn invalid_pattern_rejected() {
        let toml = r#"
[[test_patterns]]
system = "Broken"
provider = "Unknown"
pattern = "(unclosed"
"#;
        let err = ReferenceData::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("Broken"));
    }

    #[test]
    fn praxis_pattern_captures_code_and_title() {
        let refs = ReferenceData::default();
        let praxis = &refs.test_patterns[0];
        let caps = praxis
            .regex
            .captures("Required: Praxis 5001: Elementary Education. See below")
            .unwrap();
        assert_eq!(&caps[1], "5001");
        assert_eq!(caps[2].trim(), "Elementary Education");
    }
}
