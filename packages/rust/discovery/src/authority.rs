//! Authoritative-source filter for search hits.

use url::Url;

/// Whether `url`'s host contains one of the allow-list `patterns`.
///
/// Patterns are matched as lowercase substrings of the host, so `state.`
/// accepts `www.state.nj.us`. Unparsable or host-less URLs are rejected.
pub fn is_authoritative(url: &str, patterns: &[String]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    patterns.iter().any(|p| host.contains(p.as_str()))
}

#[cfg(test)]
mod tests {
    use objectivedb_shared::ReferenceData;

    use super::*;

    #[test]
    fn allow_list_hosts() {
        let refs = ReferenceData::default();
        let p = &refs.authoritative_patterns;
        assert!(is_authoritative("https://www.cde.ca.gov/tc", p));
        assert!(is_authoritative("https://www.ETS.org/praxis", p));
        assert!(is_authoritative("http://www.state.nj.us/education", p));
        assert!(is_authoritative("https://education.ohio.example/tests", p));
        assert!(is_authoritative("https://www.nesinc.com/", p));
        assert!(!is_authoritative("https://www.reddit.com/r/Teachers", p));
        assert!(!is_authoritative("https://teacherblog.com/praxis.gov-tips", p));
    }

    #[test]
    fn unparsable_urls_rejected() {
        let refs = ReferenceData::default();
        assert!(!is_authoritative("not a url", &refs.authoritative_patterns));
        assert!(!is_authoritative("", &refs.authoritative_patterns));
        assert!(!is_authoritative("mailto:someone@ed.gov", &refs.authoritative_patterns));
    }
}
