//! SSRF guard for outbound requests to URLs taken from search results.

use std::net::IpAddr;

use url::Url;

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            let host = host.to_ascii_lowercase();
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link-local)
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked(url: &str) -> bool {
        is_ssrf_target(&Url::parse(url).unwrap())
    }

    #[test]
    fn blocks_non_http_schemes() {
        assert!(blocked("file:///etc/passwd"));
        assert!(blocked("ftp://ftp.ed.gov/pub"));
    }

    #[test]
    fn blocks_private_and_loopback() {
        assert!(blocked("http://192.168.1.1/admin"));
        assert!(blocked("http://10.0.0.1/"));
        assert!(blocked("http://127.0.0.1:8080/"));
        assert!(blocked("http://[::1]/"));
        assert!(blocked("http://[fd00::1]/"));
        assert!(blocked("http://100.64.1.1/"));
    }

    #[test]
    fn blocks_local_hostnames() {
        assert!(blocked("http://localhost:3000/api"));
        assert!(blocked("http://printer.local/"));
        assert!(blocked("https://wiki.corp.internal/page"));
    }

    #[test]
    fn allows_public_hosts() {
        assert!(!blocked("https://www.cde.ca.gov/ci/"));
        assert!(!blocked("https://www.ets.org/praxis/site/for-test-takers.html"));
        assert!(!blocked("http://8.8.8.8/"));
    }
}
