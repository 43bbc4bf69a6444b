use crate::UrlError;
use url::Url;

/// Normalizes a request URL before it is packaged
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an HTTP or HTTPS scheme
/// 3. Require a host
/// 4. Remove fragment (everything after #)
///
/// The path and query are left as they are: two URLs that differ there may
/// name different resources on the origin, and each gets its own exchange.
///
/// # Examples
///
/// ```
/// use sxg_packager::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.org/page.html#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.org/page.html");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize(url)
}

/// Same as [`normalize_url`] for an already parsed URL
pub fn normalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);
    Ok(url)
}

/// Returns true if both URLs share scheme, host and port
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}
