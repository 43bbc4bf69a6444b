//! HTTP fetching
//!
//! This module handles all HTTP requests for the packager, including:
//! - Building HTTP clients with proper user agent strings
//! - The [`FetchClient`] seam tasks fetch through
//! - Error classification
//!
//! Redirects are never followed: a redirect response is returned as is and
//! the task runner treats it as a packaging failure.

use crate::processor::MAX_CONTENT_LENGTH;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{redirect::Policy, Client, Method, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default user agent, `sxg-packager/<version>`
pub const DEFAULT_USER_AGENT: &str = concat!("sxg-packager/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("body of {length} bytes exceeds the limit of {limit}")]
    TooLarge { length: u64, limit: usize },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// A request to fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl FetchRequest {
    /// A GET request without headers
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
        }
    }

    /// Same request for another URL, keeping method and headers
    pub fn for_url(&self, url: Url) -> Self {
        Self {
            method: self.method.clone(),
            url,
            headers: self.headers.clone(),
        }
    }
}

/// A fetched HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns true for 301, 302, 303, 307 and 308
    pub fn is_redirect(&self) -> bool {
        matches!(
            self.status,
            StatusCode::MOVED_PERMANENTLY
                | StatusCode::FOUND
                | StatusCode::SEE_OTHER
                | StatusCode::TEMPORARY_REDIRECT
                | StatusCode::PERMANENT_REDIRECT
        )
    }
}

/// Issues HTTP requests
///
/// Per-request timeouts are the client's responsibility.
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError>;
}

/// Settings of the default HTTP client
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Refuse plain-HTTP URLs
    pub https_only: bool,
    /// Bodies are read up to one byte past this, so preverify still sees
    /// an oversized payload as oversized
    pub max_body_length: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            https_only: true,
            max_body_length: MAX_CONTENT_LENGTH,
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use sxg_packager::packager::{build_http_client, FetchConfig};
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .redirect(Policy::none()) // Redirects are packaging failures
        .https_only(config.https_only)
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`FetchClient`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestFetchClient {
    client: Client,
    max_body_length: usize,
}

impl ReqwestFetchClient {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            max_body_length: config.max_body_length,
        })
    }

    /// Wraps an existing client; bodies are capped at the signed exchange maximum
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            max_body_length: MAX_CONTENT_LENGTH,
        }
    }
}

#[async_trait]
impl FetchClient for ReqwestFetchClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = read_body(response, self.max_body_length).await?;

        tracing::debug!("Fetched {} ({}, {} bytes)", request.url, status, body.len());
        Ok(HttpResponse::new(status, headers, body))
    }
}

/// Reads at most `limit + 1` bytes of the body
///
/// A declared `Content-Length` over `limit` fails before anything is read.
/// A body that only turns out to be too long while streaming is cut one byte
/// past `limit`, which preverify then rejects.
///
/// # Arguments
///
/// * `response` - The response whose body to read
/// * `limit` - Largest body that can be packaged
///
/// # Returns
///
/// * `Ok(Vec<u8>)` - The body, possibly cut at `limit + 1` bytes
/// * `Err(FetchError)` - The declared length is too large, or reading failed
async fn read_body(mut response: reqwest::Response, limit: usize) -> Result<Vec<u8>, FetchError> {
    if let Some(length) = response.content_length() {
        if length > limit as u64 {
            return Err(FetchError::TooLarge { length, limit });
        }
    }

    let cap = limit.saturating_add(1);
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(classify)? {
        let room = cap - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() == cap {
            tracing::debug!("Body of {} cut at {} bytes", response.url(), cap);
            break;
        }
    }
    Ok(body)
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Client(e)
    }
}
