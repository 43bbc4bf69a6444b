//! Signed exchanges and the factory that produces them
//!
//! The SXG codec (CBOR encoding, MICE content integrity, signing) lives
//! outside this crate. The packager only needs an [`ExchangeFactory`] that
//! turns a processed [`Response`] into an [`Exchange`] and can verify one,
//! reporting its header-integrity digest.

use crate::processor::Response;
use crate::resource::ValidPeriod;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Errors raised while signing or verifying an exchange
#[derive(Debug, Error)]
pub enum SignError {
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("exchange is not valid at {0}")]
    NotValidAt(DateTime<Utc>),
}

/// Header-integrity digest of a signed exchange, e.g. `sha256-<base64>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Integrity(String);

impl Integrity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Hashes `data` with SHA-256 and formats it as `sha256-<base64>`
    pub fn from_sha256(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(format!("sha256-{}", STANDARD.encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed exchange
#[derive(Debug, Clone)]
pub struct Exchange {
    /// URL the exchange claims to be a response for
    pub request_url: Url,
    pub status: StatusCode,
    /// Response headers as signed, including the generated `Link` header
    pub headers: HeaderMap,
    pub payload: Vec<u8>,
    pub valid_period: ValidPeriod,
    pub validity_url: Url,
    /// Wire bytes produced by the factory, written out by file caches
    pub signed: Vec<u8>,
}

impl Exchange {
    /// Captures a processed response together with the factory's wire bytes
    pub fn from_response(
        response: &Response,
        valid_period: &ValidPeriod,
        validity_url: &Url,
        signed: Vec<u8>,
    ) -> Self {
        Self {
            request_url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            payload: response.payload.clone(),
            valid_period: *valid_period,
            validity_url: validity_url.clone(),
            signed,
        }
    }

    /// Returns true if `date` falls within the exchange's validity period
    pub fn is_valid_at(&self, date: DateTime<Utc>) -> bool {
        self.valid_period.contains(date)
    }
}

/// Builds and verifies signed exchanges
#[async_trait]
pub trait ExchangeFactory: Send + Sync {
    /// Signs `response` for the given validity period
    async fn new_exchange(
        &self,
        response: &Response,
        valid_period: &ValidPeriod,
        validity_url: &Url,
    ) -> Result<Exchange, SignError>;

    /// Verifies `exchange` as of `date` and returns its header integrity
    async fn verify(&self, exchange: &Exchange, date: DateTime<Utc>)
        -> Result<Integrity, SignError>;

    /// Whether preloads whose targets could not be packaged stay in the
    /// `Link` header as plain preloads
    fn keep_non_sxg_preloads(&self) -> bool {
        false
    }
}
