//! Physical URL rules
//!
//! A physical URL is the URL a static file server would actually resolve for
//! a request, e.g. `/dir/` is served from `/dir/index.html`. Rules receive
//! the response headers too, so that a rule may depend on what the origin
//! returned.

use crate::url::UrlMatcher;
use reqwest::header::HeaderMap;
use url::Url;

/// Rewrites a request URL into its physical URL, in place
pub trait PhysicalUrlRule: Send + Sync {
    fn rewrite(&self, url: &mut Url, headers: &HeaderMap);
}

/// Appends an index file name to directory paths
#[derive(Debug, Clone)]
pub struct IndexRule {
    index_file: String,
}

impl IndexRule {
    pub fn new(index_file: impl Into<String>) -> Self {
        Self {
            index_file: index_file.into(),
        }
    }
}

impl Default for IndexRule {
    fn default() -> Self {
        Self::new("index.html")
    }
}

impl PhysicalUrlRule for IndexRule {
    fn rewrite(&self, url: &mut Url, _headers: &HeaderMap) {
        if url.path().ends_with('/') {
            let path = format!("{}{}", url.path(), self.index_file);
            url.set_path(&path);
        }
    }
}

/// Collapses repeated slashes in the path
///
/// Dot segments are already resolved by URL parsing; this removes the empty
/// segments that a file server would ignore. A trailing slash is kept so
/// that [`IndexRule`] can still see the directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanPath;

impl PhysicalUrlRule for CleanPath {
    fn rewrite(&self, url: &mut Url, _headers: &HeaderMap) {
        let path = url.path();
        if !path.contains("//") {
            return;
        }

        let trailing = path.ends_with('/');
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut cleaned = format!("/{}", segments.join("/"));
        if trailing && cleaned.len() > 1 {
            cleaned.push('/');
        }
        url.set_path(&cleaned);
    }
}

/// Applies rules in order
#[derive(Default)]
pub struct RuleSequence {
    rules: Vec<Box<dyn PhysicalUrlRule>>,
}

impl RuleSequence {
    pub fn new(rules: Vec<Box<dyn PhysicalUrlRule>>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: impl PhysicalUrlRule + 'static) {
        self.rules.push(Box::new(rule));
    }
}

impl PhysicalUrlRule for RuleSequence {
    fn rewrite(&self, url: &mut Url, headers: &HeaderMap) {
        for rule in &self.rules {
            rule.rewrite(url, headers);
        }
    }
}

/// Applies a rule only to URLs accepted by a matcher
pub struct Conditional {
    matcher: UrlMatcher,
    rule: Box<dyn PhysicalUrlRule>,
}

impl Conditional {
    pub fn new(matcher: UrlMatcher, rule: impl PhysicalUrlRule + 'static) -> Self {
        Self {
            matcher,
            rule: Box::new(rule),
        }
    }
}

impl PhysicalUrlRule for Conditional {
    fn rewrite(&self, url: &mut Url, headers: &HeaderMap) {
        if self.matcher.matches(url) {
            self.rule.rewrite(url, headers);
        }
    }
}

/// The rule used when none is configured: [`CleanPath`] then [`IndexRule`]
pub fn default_physical_url_rule(index_file: &str) -> RuleSequence {
    RuleSequence::new(vec![Box::new(CleanPath), Box::new(IndexRule::new(index_file))])
}
