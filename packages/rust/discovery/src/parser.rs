//! Heuristic extraction of tests and objectives from fetched page text.
//!
//! - Tests: provider patterns (`Praxis 5001: Title`, `NES 101`, `edTPA`)
//! - Objectives: lines with enough words and an action verb or a list marker

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use objectivedb_shared::types::truncate_chars;
use objectivedb_shared::{Objective, TestCandidate, TestPattern};

/// Characters of listing content kept on each candidate.
pub const CONTENT_SAMPLE_CHARS: usize = 500;

/// Lines shorter than this are skipped outright.
const MIN_LINE_CHARS: usize = 10;

/// Minimum words for a line to be considered an objective.
const MIN_OBJECTIVE_WORDS: usize = 6;

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches a leading list marker: `1.`, `2)`, `-`, `*`, `•`, `1.2.`.
static LIST_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\d.)\-*•]+\s+").expect("list marker regex")
});

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Scan `content` with each provider pattern and build test candidates.
///
/// Candidates come out in pattern order, then match order. Duplicates are
/// kept; see [`dedup_tests`].
pub fn extract_tests(content: &str, source_url: &str, patterns: &[TestPattern]) -> Vec<TestCandidate> {
    let sample = truncate_chars(content, CONTENT_SAMPLE_CHARS);
    let mut tests = Vec::new();

    for pattern in patterns {
        for caps in pattern.regex.captures_iter(content) {
            let code = caps
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .filter(|c| !c.is_empty());
            let title = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|t| !t.is_empty());

            let name = match (&title, &code) {
                (Some(title), _) => title.clone(),
                (None, Some(code)) => format!("{} {code}", pattern.system),
                (None, None) => pattern.system.clone(),
            };

            let mut test = TestCandidate::new(&pattern.system, name)
                .with_provider(&pattern.provider)
                .with_source_url(source_url);
            test.code = code;
            test.content_sample = Some(sample.clone());
            tests.push(test);
        }
    }

    tests
}

/// Drop later candidates whose `(system, name, code)` was already seen.
pub fn dedup_tests(tests: Vec<TestCandidate>) -> Vec<TestCandidate> {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    tests
        .into_iter()
        .filter(|t| {
            let (system, name, code) = t.dedup_key();
            seen.insert((system.to_string(), name.to_string(), code.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Objectives
// ---------------------------------------------------------------------------

/// Extract verified objectives from a test's framework page.
pub fn extract_objectives(content: &str, source_url: &str, verbs: &[String]) -> Vec<Objective> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() >= MIN_LINE_CHARS)
        .filter(|line| looks_like_objective(line, verbs))
        .enumerate()
        .map(|(idx, line)| Objective::verified(idx as u32, line, source_url))
        .collect()
}

fn looks_like_objective(line: &str, verbs: &[String]) -> bool {
    if line.split_whitespace().count() < MIN_OBJECTIVE_WORDS {
        return false;
    }
    let lower = line.to_lowercase();
    verbs.iter().any(|v| lower.contains(v.as_str())) || LIST_MARKER_RE.is_match(line)
}

#[cfg(test)]
mod tests {
    use objectivedb_shared::{ReferenceData, ValidationStatus};

    use super::*;

    fn refs() -> ReferenceData {
        ReferenceData::default()
    }

    #[test]
    fn extracts_praxis_nes_and_edtpa() {
        let content = "Required tests:\n\
                       Praxis 5001: Elementary Education\n\
                       Praxis 5161\n\
                       NES 103 - Elementary Mathematics\n\
                       Candidates must also complete edTPA.";
        let tests = extract_tests(content, "https://www.state.gov/tests", &refs().test_patterns);
        assert_eq!(tests.len(), 4);

        assert_eq!(tests[0].system, "Praxis");
        assert_eq!(tests[0].name, "Elementary Education");
        assert_eq!(tests[0].code.as_deref(), Some("5001"));
        assert_eq!(tests[0].provider.as_deref(), Some("ETS"));

        assert_eq!(tests[1].name, "Praxis 5161");
        assert_eq!(tests[1].code.as_deref(), Some("5161"));

        assert_eq!(tests[2].system, "NES");
        assert_eq!(tests[2].name, "Elementary Mathematics");
        assert_eq!(tests[2].provider.as_deref(), Some("Pearson"));

        assert_eq!(tests[3].system, "edTPA");
        assert_eq!(tests[3].name, "edTPA");
        assert!(tests[3].code.is_none());

        for t in &tests {
            assert_eq!(t.source_url.as_deref(), Some("https://www.state.gov/tests"));
            assert_eq!(t.content_sample.as_deref(), Some(content));
        }
    }

    #[test]
    fn content_sample_is_truncated() {
        let content = format!("Praxis 5001 {}", "x".repeat(1000));
        let tests = extract_tests(&content, "https://ets.org", &refs().test_patterns);
        assert_eq!(
            tests[0].content_sample.as_ref().unwrap().chars().count(),
            CONTENT_SAMPLE_CHARS
        );
    }

    #[test]
    fn dedup_keeps_first_seen() {
        let first = TestCandidate::new("Praxis", "Elementary Education")
            .with_code("5001")
            .with_source_url("https://a.gov/one");
        let second = TestCandidate::new("Praxis", "Elementary Education")
            .with_code("5001")
            .with_source_url("https://b.edu/two");
        let other = TestCandidate::new("Praxis", "Elementary Education");

        let unique = dedup_tests(vec![first.clone(), second, other.clone()]);
        assert_eq!(unique, vec![first, other]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let tests = extract_tests(
            "Praxis 5001: Elementary Education\nPraxis 5001: Elementary Education\nedTPA edTPA",
            "https://ets.org/x",
            &refs().test_patterns,
        );
        let once = dedup_tests(tests);
        assert_eq!(once.len(), 2);
        assert_eq!(dedup_tests(once.clone()), once);
    }

    #[test]
    fn objective_lines_selected() {
        let content = "Framework\n\
                       \n\
                       1. Knows number sense and place value concepts well\n\
                       Candidates analyze student work to guide future lessons\n\
                       Short line\n\
                       Home About Contact Login Search Menu\n\
                       - Reading, writing, speaking and listening skills for grade";
        let refs = refs();
        let objectives = extract_objectives(content, "https://www.ets.org/5001.pdf", &refs.extraction_verbs);
        assert_eq!(objectives.len(), 3);
        assert!(objectives[0].text.starts_with("1. Knows"));
        assert!(objectives[1].text.starts_with("Candidates analyze"));
        assert!(objectives[2].text.starts_with("- Reading"));
        for (i, obj) in objectives.iter().enumerate() {
            assert_eq!(obj.index, i as u32);
            assert!(!obj.is_inferred);
            assert_eq!(obj.confidence, 1.0);
            assert_eq!(obj.validation_status, ValidationStatus::Verified);
            assert_eq!(obj.evidence_url.as_deref(), Some("https://www.ets.org/5001.pdf"));
        }
    }

    #[test]
    fn no_objectives_in_empty_content() {
        assert!(extract_objectives("", "https://x.gov", &refs().extraction_verbs).is_empty());
    }
}
