//! URL handling module
//!
//! This module provides request URL normalization, composable URL matchers,
//! and the rules that derive the physical and validity URLs of a resource.

mod matcher;
mod normalize;
mod rewrite;
mod validity;

pub use matcher::{
    all_of, any_of, has_escaped_path_prefix, has_escaped_path_regexp, has_host, has_hostname,
    has_hostname_suffix, has_raw_query_regexp, has_scheme, not, UrlMatcher,
};
pub use normalize::{normalize, normalize_url, same_origin};
pub use rewrite::{
    default_physical_url_rule, CleanPath, Conditional, IndexRule, PhysicalUrlRule, RuleSequence,
};
pub use validity::{
    AppendExtDotLastModified, AppendExtDotUnixTime, ValidityUrlRule, DEFAULT_VALIDITY_EXTENSION,
};
