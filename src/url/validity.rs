//! Validity URL rules
//!
//! The validity URL names where the signature-update data of an exchange
//! would be hosted. It is derived from the physical URL; the default rule
//! appends `.validity.<unix time>`, the time being the signing date of the
//! packaging run.

use crate::{UrlError, UrlResult};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, LAST_MODIFIED};
use url::Url;

/// Extension used by the default validity URL rule
pub const DEFAULT_VALIDITY_EXTENSION: &str = ".validity";

/// Derives a validity URL from a physical URL
pub trait ValidityUrlRule: Send + Sync {
    /// Computes the validity URL
    ///
    /// `date` is the signing date of the packaging run.
    fn validity_url(
        &self,
        physical_url: &Url,
        headers: &HeaderMap,
        date: DateTime<Utc>,
    ) -> UrlResult<Url>;
}

/// Appends `<ext>.<unix time of the signing date>` to the path
#[derive(Debug, Clone)]
pub struct AppendExtDotUnixTime {
    ext: String,
}

impl AppendExtDotUnixTime {
    pub fn new(ext: impl Into<String>) -> Self {
        Self { ext: ext.into() }
    }
}

impl Default for AppendExtDotUnixTime {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDITY_EXTENSION)
    }
}

impl ValidityUrlRule for AppendExtDotUnixTime {
    fn validity_url(
        &self,
        physical_url: &Url,
        _headers: &HeaderMap,
        date: DateTime<Utc>,
    ) -> UrlResult<Url> {
        append_suffix(physical_url, &format!("{}.{}", self.ext, date.timestamp()))
    }
}

/// Appends `<ext>.<unix time of Last-Modified>` to the path
///
/// Fails when the response carries no parseable `Last-Modified` header.
#[derive(Debug, Clone)]
pub struct AppendExtDotLastModified {
    ext: String,
}

impl AppendExtDotLastModified {
    pub fn new(ext: impl Into<String>) -> Self {
        Self { ext: ext.into() }
    }
}

impl ValidityUrlRule for AppendExtDotLastModified {
    fn validity_url(
        &self,
        physical_url: &Url,
        headers: &HeaderMap,
        _date: DateTime<Utc>,
    ) -> UrlResult<Url> {
        let value = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| UrlError::MissingHeader("Last-Modified".to_string()))?;
        let modified = DateTime::parse_from_rfc2822(value).map_err(|e| {
            UrlError::Malformed(format!("invalid Last-Modified '{}': {}", value, e))
        })?;
        append_suffix(physical_url, &format!("{}.{}", self.ext, modified.timestamp()))
    }
}

/// Appends `suffix` to the path, dropping query and fragment
fn append_suffix(url: &Url, suffix: &str) -> UrlResult<Url> {
    if url.cannot_be_a_base() {
        return Err(UrlError::Malformed(format!(
            "cannot derive a path from {}",
            url
        )));
    }

    let mut validity = url.clone();
    let path = format!("{}{}", url.path(), suffix);
    validity.set_path(&path);
    validity.set_query(None);
    validity.set_fragment(None);
    Ok(validity)
}
