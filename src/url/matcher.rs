//! Composable predicates over absolute URLs
//!
//! A [`UrlMatcher`] is a small tagged tree: leaf predicates inspect one part
//! of the URL (scheme, host, path, query) and the combinators
//! [`all_of`], [`any_of`] and [`not`] compose them.
//!
//! Host comparisons fold ASCII letters only; non-ASCII bytes are compared
//! literally (RFC 4343 §3).

use regex::Regex;
use url::Url;

/// A predicate over an absolute URL
#[derive(Debug, Clone)]
pub enum UrlMatcher {
    /// Scheme equals the given value (ASCII case-insensitive)
    Scheme(String),
    /// Host, including an explicit port, equals the given value
    Host(String),
    /// Hostname, without port, equals the given value
    Hostname(String),
    /// Hostname ends with the given suffix, see [`has_hostname_suffix`]
    HostnameSuffix(String),
    /// Escaped path starts with the given prefix
    EscapedPathPrefix(String),
    /// Escaped path matches the regular expression
    EscapedPathRegex(Regex),
    /// Raw query string matches the regular expression
    RawQueryRegex(Regex),
    /// Every child matches; true when empty
    AllOf(Vec<UrlMatcher>),
    /// At least one child matches; false when empty
    AnyOf(Vec<UrlMatcher>),
    /// The child does not match
    Not(Box<UrlMatcher>),
}

impl UrlMatcher {
    /// Evaluates the predicate against `url`
    ///
    /// `AllOf` and `AnyOf` evaluate their children in order and stop at the
    /// first child that decides the result.
    pub fn matches(&self, url: &Url) -> bool {
        match self {
            Self::Scheme(scheme) => url.scheme().eq_ignore_ascii_case(scheme),
            Self::Host(host) => host_with_port(url).eq_ignore_ascii_case(host),
            Self::Hostname(name) => hostname(url).eq_ignore_ascii_case(name),
            Self::HostnameSuffix(suffix) => matches_hostname_suffix(hostname(url), suffix),
            Self::EscapedPathPrefix(prefix) => url.path().starts_with(prefix.as_str()),
            Self::EscapedPathRegex(re) => re.is_match(url.path()),
            Self::RawQueryRegex(re) => re.is_match(url.query().unwrap_or("")),
            Self::AllOf(children) => children.iter().all(|m| m.matches(url)),
            Self::AnyOf(children) => children.iter().any(|m| m.matches(url)),
            Self::Not(child) => !child.matches(url),
        }
    }
}

/// Matches URLs whose scheme equals `scheme`
pub fn has_scheme(scheme: impl Into<String>) -> UrlMatcher {
    UrlMatcher::Scheme(scheme.into())
}

/// Matches URLs whose host (including an explicit port) equals `host`
///
/// ```
/// use sxg_packager::url::has_host;
/// use url::Url;
///
/// let m = has_host("example.org:8080");
/// assert!(m.matches(&Url::parse("https://EXAMPLE.org:8080/").unwrap()));
/// assert!(!m.matches(&Url::parse("https://example.org/").unwrap()));
/// ```
pub fn has_host(host: impl Into<String>) -> UrlMatcher {
    UrlMatcher::Host(host.into())
}

/// Matches URLs whose hostname (without port) equals `name`
pub fn has_hostname(name: impl Into<String>) -> UrlMatcher {
    UrlMatcher::Hostname(name.into())
}

/// Matches URLs by hostname suffix
///
/// A suffix with a leading dot (".example.org") matches strict subdomains
/// only. A suffix without one ("example.org") matches the domain itself and
/// any of its subdomains.
pub fn has_hostname_suffix(suffix: impl Into<String>) -> UrlMatcher {
    UrlMatcher::HostnameSuffix(suffix.into())
}

/// Matches URLs whose escaped path starts with `prefix`
pub fn has_escaped_path_prefix(prefix: impl Into<String>) -> UrlMatcher {
    UrlMatcher::EscapedPathPrefix(prefix.into())
}

/// Matches URLs whose escaped path matches `re`
pub fn has_escaped_path_regexp(re: Regex) -> UrlMatcher {
    UrlMatcher::EscapedPathRegex(re)
}

/// Matches URLs whose raw query matches `re`; a missing query is ""
pub fn has_raw_query_regexp(re: Regex) -> UrlMatcher {
    UrlMatcher::RawQueryRegex(re)
}

/// Matches when every matcher matches
pub fn all_of(matchers: Vec<UrlMatcher>) -> UrlMatcher {
    UrlMatcher::AllOf(matchers)
}

/// Matches when any matcher matches
pub fn any_of(matchers: Vec<UrlMatcher>) -> UrlMatcher {
    UrlMatcher::AnyOf(matchers)
}

/// Inverts a matcher
pub fn not(matcher: UrlMatcher) -> UrlMatcher {
    UrlMatcher::Not(Box::new(matcher))
}

/// Returns the hostname without brackets around IPv6 literals
fn hostname(url: &Url) -> &str {
    let host = url.host_str().unwrap_or("");
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn ends_with_ignore_ascii_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.as_bytes()[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

fn matches_hostname_suffix(candidate: &str, suffix: &str) -> bool {
    if suffix.starts_with('.') {
        // Strict subdomain: something must precede the suffix
        candidate.len() > suffix.len() && ends_with_ignore_ascii_case(candidate, suffix)
    } else {
        candidate.eq_ignore_ascii_case(suffix)
            || (candidate.len() > suffix.len()
                && ends_with_ignore_ascii_case(candidate, suffix)
                && candidate.as_bytes()[candidate.len() - suffix.len() - 1] == b'.')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_empty_combinators() {
        let u = url("https://example.org/");
        assert!(all_of(vec![]).matches(&u));
        assert!(!any_of(vec![]).matches(&u));
    }

    #[test]
    fn test_scheme() {
        assert!(has_scheme("HTTPS").matches(&url("https://example.org/")));
        assert!(!has_scheme("https").matches(&url("http://example.org/")));
    }

    #[test]
    fn test_host_includes_port() {
        let m = has_host("example.org:8443");
        assert!(m.matches(&url("https://example.org:8443/a")));
        assert!(!m.matches(&url("https://example.org/a")));
        assert!(has_host("example.org").matches(&url("https://example.org/a")));
    }

    #[test]
    fn test_hostname_excludes_port() {
        let m = has_hostname("Example.ORG");
        assert!(m.matches(&url("https://example.org:8443/a")));
        assert!(m.matches(&url("https://example.org/a")));
        assert!(!m.matches(&url("https://www.example.org/a")));
    }

    #[test]
    fn test_hostname_ipv6() {
        assert!(has_hostname("::1").matches(&url("http://[::1]:8080/")));
    }

    #[test]
    fn test_hostname_suffix_strict_subdomain() {
        let m = has_hostname_suffix(".example.org");
        assert!(m.matches(&url("https://www.example.org/")));
        assert!(m.matches(&url("https://a.b.EXAMPLE.org/")));
        assert!(!m.matches(&url("https://example.org/")));
        assert!(!m.matches(&url("https://notexample.org/")));
    }

    #[test]
    fn test_hostname_suffix_domain_and_subdomains() {
        let m = has_hostname_suffix("example.org");
        assert!(m.matches(&url("https://example.org/")));
        assert!(m.matches(&url("https://www.example.org/")));
        assert!(!m.matches(&url("https://myexample.org/")));
        assert!(!m.matches(&url("https://example.org.evil.com/")));
    }

    #[test]
    fn test_escaped_path_prefix_is_case_sensitive() {
        let m = has_escaped_path_prefix("/amp/");
        assert!(m.matches(&url("https://example.org/amp/page.html")));
        assert!(!m.matches(&url("https://example.org/AMP/page.html")));
    }

    #[test]
    fn test_escaped_path_regexp_sees_escapes() {
        let m = has_escaped_path_regexp(Regex::new(r"%20").unwrap());
        assert!(m.matches(&url("https://example.org/a%20b")));
        assert!(m.matches(&url("https://example.org/a b")));
    }

    #[test]
    fn test_raw_query_regexp() {
        let m = has_raw_query_regexp(Regex::new(r"^$").unwrap());
        assert!(m.matches(&url("https://example.org/")));
        assert!(!m.matches(&url("https://example.org/?q=1")));
    }

    #[test]
    fn test_not_and_composition() {
        let m = all_of(vec![
            has_scheme("https"),
            has_hostname_suffix("example.org"),
            not(has_escaped_path_prefix("/private/")),
        ]);
        assert!(m.matches(&url("https://example.org/public/a.html")));
        assert!(!m.matches(&url("https://example.org/private/a.html")));
        assert!(!m.matches(&url("http://example.org/public/a.html")));
    }

    #[test]
    fn test_non_ascii_compared_literally() {
        // Only ASCII letters fold: the Kelvin sign must not match "k"
        assert!(!ends_with_ignore_ascii_case("\u{212A}", "k"));
        assert!(!matches_hostname_suffix("\u{212A}.example", "k.example"));
    }
}
