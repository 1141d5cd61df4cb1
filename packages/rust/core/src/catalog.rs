//! The catalog of processing units (the 50 U.S. states) and the sample tests
//! used in demo mode and when discovery finds nothing.

use async_trait::async_trait;

use objectivedb_discovery::{DiscoveryOutcome, ObjectiveExtraction};
use objectivedb_shared::{ObjectiveDbError, ProcessingUnit, Result, TestCandidate};

use crate::pipeline::TestSource;

/// All 50 U.S. states as `(name, code)`.
pub const US_STATES: [(&str, &str); 50] = [
    ("Alabama", "AL"),
    ("Alaska", "AK"),
    ("Arizona", "AZ"),
    ("Arkansas", "AR"),
    ("California", "CA"),
    ("Colorado", "CO"),
    ("Connecticut", "CT"),
    ("Delaware", "DE"),
    ("Florida", "FL"),
    ("Georgia", "GA"),
    ("Hawaii", "HI"),
    ("Idaho", "ID"),
    ("Illinois", "IL"),
    ("Indiana", "IN"),
    ("Iowa", "IA"),
    ("Kansas", "KS"),
    ("Kentucky", "KY"),
    ("Louisiana", "LA"),
    ("Maine", "ME"),
    ("Maryland", "MD"),
    ("Massachusetts", "MA"),
    ("Michigan", "MI"),
    ("Minnesota", "MN"),
    ("Mississippi", "MS"),
    ("Missouri", "MO"),
    ("Montana", "MT"),
    ("Nebraska", "NE"),
    ("Nevada", "NV"),
    ("New Hampshire", "NH"),
    ("New Jersey", "NJ"),
    ("New Mexico", "NM"),
    ("New York", "NY"),
    ("North Carolina", "NC"),
    ("North Dakota", "ND"),
    ("Ohio", "OH"),
    ("Oklahoma", "OK"),
    ("Oregon", "OR"),
    ("Pennsylvania", "PA"),
    ("Rhode Island", "RI"),
    ("South Carolina", "SC"),
    ("South Dakota", "SD"),
    ("Tennessee", "TN"),
    ("Texas", "TX"),
    ("Utah", "UT"),
    ("Vermont", "VT"),
    ("Virginia", "VA"),
    ("Washington", "WA"),
    ("West Virginia", "WV"),
    ("Wisconsin", "WI"),
    ("Wyoming", "WY"),
];

/// Every unit in catalog order.
pub fn all_units() -> Vec<ProcessingUnit> {
    US_STATES
        .iter()
        .map(|(name, code)| ProcessingUnit {
            name: (*name).to_string(),
            short_code: (*code).to_string(),
        })
        .collect()
}

/// Resolve short codes (case-insensitive) to units, keeping the given order.
pub fn select_units(codes: &[String]) -> Result<Vec<ProcessingUnit>> {
    let units = all_units();
    codes
        .iter()
        .map(|code| {
            units
                .iter()
                .find(|u| u.short_code.eq_ignore_ascii_case(code.trim()))
                .cloned()
                .ok_or_else(|| ObjectiveDbError::config(format!("unknown unit code: {code}")))
        })
        .collect()
}

/// Representative tests for a unit: two Praxis tests and the unit's own exam.
pub fn sample_tests(unit: &ProcessingUnit) -> Vec<TestCandidate> {
    let mut tests = vec![
        TestCandidate::new("Praxis", "Elementary Education: Multiple Subjects")
            .with_code("5001")
            .with_subject("Elementary Education")
            .with_grade_band("K-6")
            .with_provider("ETS")
            .with_source_url("https://www.ets.org/praxis/prepare/materials/5001"),
        TestCandidate::new("Praxis", "Mathematics: Content Knowledge")
            .with_code("5161")
            .with_subject("Mathematics")
            .with_grade_band("7-12")
            .with_provider("ETS")
            .with_source_url("https://www.ets.org/praxis/prepare/materials/5161"),
        TestCandidate::new(
            format!("{} State Exam", unit.short_code),
            format!("{} Teaching Foundations", unit.name),
        )
        .with_subject("General Education")
        .with_grade_band("All")
        .with_provider("State DOE")
        .with_source_url(format!(
            "https://{}.gov/education/teacher-certification",
            unit.short_code.to_lowercase()
        )),
    ];
    for test in &mut tests {
        test.source_updated = Some("2024".into());
    }
    tests
}

/// Offline test source serving [`sample_tests`]. Used in demo mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleCatalog;

#[async_trait]
impl TestSource for SampleCatalog {
    async fn discover(&self, unit: &ProcessingUnit) -> Result<DiscoveryOutcome> {
        Ok(DiscoveryOutcome {
            tests: sample_tests(unit),
            ..DiscoveryOutcome::default()
        })
    }

    async fn extract_objectives(&self, _test: &TestCandidate) -> ObjectiveExtraction {
        ObjectiveExtraction::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_fifty_unique_units() {
        let units = all_units();
        assert_eq!(units.len(), 50);
        let mut codes: Vec<_> = units.iter().map(|u| u.short_code.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 50);
        assert_eq!(units[0].name, "Alabama");
        assert_eq!(units[49].short_code, "WY");
    }

    #[test]
    fn select_units_by_code() {
        let units = select_units(&["ak".into(), " AL ".into()]).unwrap();
        assert_eq!(units[0].name, "Alaska");
        assert_eq!(units[1].name, "Alabama");

        let err = select_units(&["ZZ".into()]).unwrap_err();
        assert!(err.to_string().contains("ZZ"));
    }

    #[test]
    fn sample_tests_include_unit_exam() {
        let unit = ProcessingUnit::new("New Mexico", "NM").unwrap();
        let tests = sample_tests(&unit);
        assert_eq!(tests.len(), 3);
        assert_eq!(tests[0].code.as_deref(), Some("5001"));
        assert_eq!(tests[2].system, "NM State Exam");
        assert_eq!(tests[2].name, "New Mexico Teaching Foundations");
        assert!(tests[2].code.is_none());
        assert_eq!(
            tests[2].source_url.as_deref(),
            Some("https://nm.gov/education/teacher-certification")
        );
        assert!(tests.iter().all(|t| t.source_updated.as_deref() == Some("2024")));
    }

    #[tokio::test]
    async fn sample_catalog_discovers_without_queries() {
        let unit = ProcessingUnit::new("Ohio", "OH").unwrap();
        let outcome = SampleCatalog.discover(&unit).await.unwrap();
        assert_eq!(outcome.tests.len(), 3);
        assert_eq!(outcome.queries_run, 0);
        assert!(outcome.sources.is_empty());
    }
}
