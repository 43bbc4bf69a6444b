//! Preverification of responses
//!
//! Rejects responses that cannot be packaged before any further processing
//! is spent on them.

use super::{Processor, ProcessorError, Response};
use crate::url::UrlMatcher;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

/// Largest payload a signed exchange may carry (8 MiB)
pub const MAX_CONTENT_LENGTH: usize = 8 * 1024 * 1024;

/// Headers that carry per-user state and must not be signed
pub const STATEFUL_HEADERS: &[&str] = &[
    "authentication-control",
    "authentication-info",
    "clear-site-data",
    "optional-www-authenticate",
    "proxy-authenticate",
    "proxy-authentication-info",
    "public-key-pins",
    "sec-websocket-accept",
    "set-cookie",
    "set-cookie2",
    "setprofile",
    "strict-transport-security",
    "www-authenticate",
];

/// Connection-level headers that never survive into a signed exchange
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Reasons a response is rejected
#[derive(Debug, Error)]
pub enum PreverifyError {
    #[error("status code {0} cannot be signed")]
    Status(StatusCode),

    #[error("payload of {size} bytes exceeds the limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("response is not cacheable (Cache-Control: {0})")]
    NotCacheable(String),

    #[error("forbidden header present: {0}")]
    ForbiddenHeader(String),

    #[error("required header missing: {0}")]
    MissingHeader(&'static str),

    #[error("URL {0} is not allowed")]
    UrlNotAllowed(Url),
}

/// Preverify knobs
#[derive(Debug, Clone)]
pub struct PreverifyConfig {
    pub max_content_length: usize,
    /// Accept only 200 when set; any 2xx otherwise
    pub strict_status: bool,
    /// Lowercase header names whose presence rejects the response
    pub forbidden_headers: Vec<String>,
    pub url_matcher: Option<UrlMatcher>,
}

impl Default for PreverifyConfig {
    fn default() -> Self {
        Self {
            max_content_length: MAX_CONTENT_LENGTH,
            strict_status: true,
            forbidden_headers: STATEFUL_HEADERS.iter().map(|h| h.to_string()).collect(),
            url_matcher: None,
        }
    }
}

/// Processor that runs the preverify checks
#[derive(Debug, Clone, Default)]
pub struct Preverify {
    config: PreverifyConfig,
}

impl Preverify {
    pub fn new(config: PreverifyConfig) -> Self {
        Self { config }
    }

    /// Runs every check in order and reports the first failure
    pub fn check(&self, response: &Response) -> Result<(), PreverifyError> {
        let config = &self.config;

        let status_ok = if config.strict_status {
            response.status == StatusCode::OK
        } else {
            response.status.is_success()
        };
        if !status_ok {
            return Err(PreverifyError::Status(response.status));
        }

        if response.payload.len() > config.max_content_length {
            return Err(PreverifyError::TooLarge {
                size: response.payload.len(),
                max: config.max_content_length,
            });
        }

        for value in response.headers.get_all(CACHE_CONTROL) {
            let value = value.to_str().unwrap_or_default();
            let uncacheable = value.split(',').any(|directive| {
                let name = directive.split('=').next().unwrap_or_default().trim();
                name.eq_ignore_ascii_case("no-store") || name.eq_ignore_ascii_case("private")
            });
            if uncacheable {
                return Err(PreverifyError::NotCacheable(value.to_string()));
            }
        }

        if let Some(name) = config
            .forbidden_headers
            .iter()
            .find(|name| response.headers.contains_key(name.as_str()))
        {
            return Err(PreverifyError::ForbiddenHeader(name.clone()));
        }

        if !response.headers.contains_key(CONTENT_TYPE) {
            return Err(PreverifyError::MissingHeader("Content-Type"));
        }

        if let Some(matcher) = &config.url_matcher {
            if !matcher.matches(&response.url) {
                return Err(PreverifyError::UrlNotAllowed(response.url.clone()));
            }
        }

        Ok(())
    }
}

impl Processor for Preverify {
    fn process(&self, response: &mut Response) -> Result<(), ProcessorError> {
        self.check(response)?;
        Ok(())
    }
}
