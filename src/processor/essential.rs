//! Essential processors run on every response
//!
//! Before main processing, `rel=preload` entries of the origin's `Link`
//! header become [`Preload`](crate::preload::Preload)s. After it, headers
//! are normalized and everything that must not be signed is removed.

use super::preverify::{HOP_BY_HOP_HEADERS, STATEFUL_HEADERS};
use super::{Processor, ProcessorError, Response, Sequential};
use crate::preload::parse_link_header;
use reqwest::header::{
    HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, LINK, X_CONTENT_TYPE_OPTIONS,
};

/// Processors run before main processing
pub fn essential_pre() -> Sequential {
    Sequential::new(vec![Box::new(ExtractPreloadHeaders)])
}

/// Processors run after main processing
pub fn essential_post() -> Sequential {
    Sequential::new(vec![
        Box::new(NormalizeContentType),
        Box::new(StripUnsignableHeaders),
    ])
}

/// Moves `Link: rel=preload` entries into the response's preloads
///
/// `allowed-alt-sxg` entries sent by the origin are dropped, since the
/// packager regenerates them; all other entries stay in the header.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractPreloadHeaders;

impl Processor for ExtractPreloadHeaders {
    fn process(&self, response: &mut Response) -> Result<(), ProcessorError> {
        let headers: Vec<String> = response
            .headers
            .get_all(LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        if headers.is_empty() {
            return Ok(());
        }

        let mut kept = Vec::new();
        for header in &headers {
            for link in parse_link_header(header) {
                if link.has_rel("allowed-alt-sxg") {
                    continue;
                }
                if link.has_rel("preload") {
                    match link.to_preload(&response.url) {
                        Some(preload) => {
                            response.add_preload(preload);
                        }
                        None => tracing::warn!(
                            "Skipping preload with invalid target '{}' on {}",
                            link.target,
                            response.url
                        ),
                    }
                    continue;
                }
                kept.push(link.to_header_value());
            }
        }

        response.headers.remove(LINK);
        if !kept.is_empty() {
            let value = HeaderValue::from_str(&kept.join(","))
                .map_err(|e| ProcessorError::InvalidHeader(format!("Link: {}", e)))?;
            response.headers.insert(LINK, value);
        }
        Ok(())
    }
}

/// Lowercases the media type of `Content-Type` and adds `nosniff`
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeContentType;

impl Processor for NormalizeContentType {
    fn process(&self, response: &mut Response) -> Result<(), ProcessorError> {
        if let Some(value) = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            let normalized = match value.split_once(';') {
                Some((media_type, params)) => {
                    format!("{};{}", media_type.trim().to_ascii_lowercase(), params)
                }
                None => value.trim().to_ascii_lowercase(),
            };
            let normalized = HeaderValue::from_str(&normalized)
                .map_err(|e| ProcessorError::InvalidHeader(format!("Content-Type: {}", e)))?;
            response.headers.insert(CONTENT_TYPE, normalized);
        }

        response
            .headers
            .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        Ok(())
    }
}

/// Removes hop-by-hop, connection-named and stateful headers
/// and `Content-Length`
#[derive(Debug, Clone, Copy, Default)]
pub struct StripUnsignableHeaders;

impl Processor for StripUnsignableHeaders {
    fn process(&self, response: &mut Response) -> Result<(), ProcessorError> {
        let named: Vec<String> = response
            .headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        for name in named.iter().map(String::as_str) {
            response.headers.remove(name);
        }
        for name in HOP_BY_HOP_HEADERS.iter().chain(STATEFUL_HEADERS) {
            response.headers.remove(*name);
        }
        response.headers.remove(CONTENT_LENGTH);
        Ok(())
    }
}
