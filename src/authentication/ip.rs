//! IP address matching with a single trailing-octet wildcard.

use std::collections::HashSet;

/// True when `ip` is a storable address pattern.
///
/// The full wildcard `*.*.*.*` is admitted; any other pattern whose first
/// character is `*`, or that holds more than one `*`, is rejected.
#[must_use]
pub fn is_okay_ip(ip: &str) -> bool {
    if ip.trim().is_empty() {
        return false;
    }
    if ip == "*.*.*.*" {
        return true;
    }
    if ip.starts_with('*') {
        return false;
    }
    ip.chars().filter(|&c| c == '*').count() <= 1
}

/// True when `ip` matches any stored address, honoring wildcards.
///
/// `127.*` matches `127.23.34.55`; `*.*.*.*` matches everything.
#[must_use]
pub fn ip_matches(ip: &str, addresses: &HashSet<String>) -> bool {
    if addresses.contains(ip) {
        return true;
    }
    if addresses.contains("*.*.*.*") {
        return true;
    }
    for address in addresses {
        if let Some(position) = address.find('*') {
            if position > 0 {
                let prefix = &address[..position.saturating_sub(1)];
                if ip.starts_with(prefix) {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(addresses: &[&str]) -> HashSet<String> {
        addresses.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn trailing_wildcard_matches_subnet() {
        let addresses = set(&["127.*"]);
        assert!(ip_matches("127.23.34.55", &addresses));
        assert!(!ip_matches("128.0.0.1", &addresses));
    }

    #[test]
    fn two_octet_wildcard_matches() {
        let addresses = set(&["127.23.*"]);
        assert!(ip_matches("127.23.34.55", &addresses));
        assert!(!ip_matches("127.24.34.55", &addresses));
    }

    #[test]
    fn full_wildcard_matches_everything() {
        let addresses = set(&["*.*.*.*"]);
        assert!(ip_matches("10.11.12.13", &addresses));
        assert!(ip_matches("anything", &addresses));
    }

    #[test]
    fn exact_match_works_without_wildcards() {
        let addresses = set(&["192.168.1.4"]);
        assert!(ip_matches("192.168.1.4", &addresses));
        assert!(!ip_matches("192.168.1.5", &addresses));
    }

    #[test]
    fn okay_ip_boundary_cases() {
        assert!(is_okay_ip("*.*.*.*"));
        assert!(is_okay_ip("127.*"));
        assert!(is_okay_ip("127.23.34.55"));
        assert!(!is_okay_ip("*"));
        assert!(!is_okay_ip("*.23.34.55"));
        assert!(!is_okay_ip("127.*.*"));
        assert!(!is_okay_ip(""));
        assert!(!is_okay_ip("   "));
    }
}
