//! Tiered search queries for a processing unit.

use objectivedb_shared::ProcessingUnit;

/// Query tier, from most to least authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTier {
    /// Department of education requirement pages.
    Official,
    /// Test frameworks and blueprints.
    Framework,
    /// Test provider pages.
    Provider,
    /// Jurisdiction-specific exams.
    Jurisdiction,
}

impl QueryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Framework => "framework",
            Self::Provider => "provider",
            Self::Jurisdiction => "jurisdiction",
        }
    }
}

/// One search query and the tier it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub tier: QueryTier,
    pub text: String,
}

/// Build the ordered query list for a unit (11 queries, four tiers).
pub fn build_queries(unit: &ProcessingUnit) -> Vec<Query> {
    let name = &unit.name;
    let code = &unit.short_code;

    let q = |tier, text: String| Query { tier, text };
    vec![
        q(
            QueryTier::Official,
            format!("{name} teacher certification tests requirements site:.gov"),
        ),
        q(
            QueryTier::Official,
            format!("{name} department of education teacher licensing exams"),
        ),
        q(
            QueryTier::Official,
            format!("{code} DOE teacher certification test list"),
        ),
        q(
            QueryTier::Framework,
            format!("{name} teacher certification test objectives site:.gov"),
        ),
        q(
            QueryTier::Framework,
            format!("{name} teacher test blueprint framework"),
        ),
        q(
            QueryTier::Framework,
            format!("{name} teacher certification test competencies"),
        ),
        q(
            QueryTier::Provider,
            format!("{name} Praxis tests required teaching license"),
        ),
        q(QueryTier::Provider, format!("{name} NES teacher tests objectives")),
        q(
            QueryTier::Provider,
            format!("{name} teacher certification exam study guide objectives site:edu"),
        ),
        q(QueryTier::Jurisdiction, format!("{name} state teacher exam framework")),
        q(
            QueryTier::Jurisdiction,
            format!("{code} educator certification assessment objectives"),
        ),
    ]
}

/// Fetch instructions for a page that may list a unit's tests.
pub fn test_listing_instructions(unit: &ProcessingUnit) -> String {
    format!(
        "Extract all teacher certification tests mentioned on this page for {}.\n\n\
         For each test, identify:\n\
         - Test name (e.g., \"Elementary Education\", \"Mathematics Content Knowledge\")\n\
         - Test code/number if available (e.g., \"5001\", \"236\")\n\
         - Test system/provider (Praxis, NES, edTPA, state-specific, etc.)\n\
         - Subject area\n\
         - Grade band (K-6, 7-12, etc.)\n\n\
         Return structured information about each test found.",
        unit.name
    )
}

/// Fetch instructions for a test's objective/framework page.
pub fn objective_instructions(test_name: &str, provider: Option<&str>) -> String {
    format!(
        "Extract all test objectives, competencies, or framework points for this teacher certification test.\n\n\
         Test: {test_name}\n\
         Provider: {}\n\n\
         Look for:\n\
         - Numbered or bulleted objective lists\n\
         - Competency statements\n\
         - Test framework sections\n\
         - Content domain descriptions\n\n\
         Return the objectives as a structured list with their original numbering if available.",
        provider.unwrap_or("Unknown")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eleven_queries_in_tier_order() {
        let unit = ProcessingUnit::new("California", "CA").unwrap();
        let queries = build_queries(&unit);
        assert_eq!(queries.len(), 11);

        let tiers: Vec<QueryTier> = queries.iter().map(|q| q.tier).collect();
        let counts = |t| tiers.iter().filter(|&&x| x == t).count();
        assert_eq!(counts(QueryTier::Official), 3);
        assert_eq!(counts(QueryTier::Framework), 3);
        assert_eq!(counts(QueryTier::Provider), 3);
        assert_eq!(counts(QueryTier::Jurisdiction), 2);
        assert!(tiers.windows(2).all(|w| (w[0] as u8) <= (w[1] as u8)));

        assert_eq!(
            queries[0].text,
            "California teacher certification tests requirements site:.gov"
        );
        assert_eq!(queries[2].text, "CA DOE teacher certification test list");
        assert_eq!(queries[10].text, "CA educator certification assessment objectives");
    }

    #[test]
    fn queries_are_deterministic() {
        let unit = ProcessingUnit::new("Ohio", "OH").unwrap();
        assert_eq!(build_queries(&unit), build_queries(&unit));
    }

    #[test]
    fn instructions_name_the_target() {
        let unit = ProcessingUnit::new("Texas", "TX").unwrap();
        assert!(test_listing_instructions(&unit).contains("for Texas."));
        let text = objective_instructions("Mathematics: Content Knowledge", None);
        assert!(text.contains("Test: Mathematics: Content Knowledge"));
        assert!(text.contains("Provider: Unknown"));
    }
}
