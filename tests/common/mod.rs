//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, LINK, LOCATION};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Mutex;
use sxg_packager::exchange::{Exchange, ExchangeFactory, Integrity, SignError};
use sxg_packager::packager::{FetchClient, FetchError, FetchRequest, HttpResponse};
use sxg_packager::{Response, ValidPeriod};
use url::Url;

/// 2019-05-13T10:30:00Z
pub fn signing_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 5, 13, 10, 30, 0).unwrap()
}

/// Seven days from [`signing_date`]
pub fn period() -> ValidPeriod {
    ValidPeriod::with_lifetime(signing_date(), Duration::days(7))
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Serves canned responses and records every request, in order
///
/// Unknown URLs get a 404.
#[derive(Default)]
pub struct FixtureClient {
    routes: HashMap<String, HttpResponse>,
    log: Mutex<Vec<FetchRequest>>,
}

impl FixtureClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` with status 200
    pub fn with(self, url: &str, content_type: &'static str, body: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.with_response(url, HttpResponse::new(StatusCode::OK, headers, body.into()))
    }

    /// Serves HTML that also sends a `Link` header
    pub fn with_link(self, url: &str, link: &str, body: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(LINK, HeaderValue::from_str(link).unwrap());
        self.with_response(url, HttpResponse::new(StatusCode::OK, headers, body.into()))
    }

    pub fn with_redirect(self, url: &str, location: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_str(location).unwrap());
        self.with_response(url, HttpResponse::new(StatusCode::FOUND, headers, Vec::new()))
    }

    pub fn with_response(mut self, url: &str, response: HttpResponse) -> Self {
        self.routes.insert(url.to_string(), response);
        self
    }

    /// URLs requested so far
    pub fn fetched(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.url.to_string())
            .collect()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetched().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl FetchClient for FixtureClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError> {
        self.log.lock().unwrap().push(request.clone());
        Ok(self.routes.get(request.url.as_str()).cloned().unwrap_or_else(|| {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            HttpResponse::new(StatusCode::NOT_FOUND, headers, b"not found".to_vec())
        }))
    }
}

/// Deterministic stand-in for a real signer
///
/// The "signed" bytes are a canonical dump of the exchange; the header
/// integrity is the SHA-256 of its status and sorted headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeExchangeFactory {
    pub keep_non_sxg_preloads: bool,
}

impl FakeExchangeFactory {
    pub fn keeping_non_sxg_preloads() -> Self {
        Self {
            keep_non_sxg_preloads: true,
        }
    }
}

fn canonical_headers(status: StatusCode, headers: &HeaderMap) -> Vec<u8> {
    let mut lines: Vec<String> = headers
        .iter()
        .map(|(name, value)| {
            format!(
                "{}: {}",
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes())
            )
        })
        .collect();
    lines.sort();

    let mut out = format!("{}\n", status.as_u16()).into_bytes();
    for line in lines {
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
    }
    out
}

#[async_trait]
impl ExchangeFactory for FakeExchangeFactory {
    async fn new_exchange(
        &self,
        response: &Response,
        valid_period: &ValidPeriod,
        validity_url: &Url,
    ) -> Result<Exchange, SignError> {
        let mut signed = format!(
            "{}\n{}\n{}\n{}\n",
            response.url,
            valid_period.date().timestamp(),
            valid_period.expires().timestamp(),
            validity_url
        )
        .into_bytes();
        signed.extend(canonical_headers(response.status, &response.headers));
        signed.push(b'\n');
        signed.extend_from_slice(&response.payload);

        Ok(Exchange::from_response(
            response,
            valid_period,
            validity_url,
            signed,
        ))
    }

    async fn verify(
        &self,
        exchange: &Exchange,
        date: DateTime<Utc>,
    ) -> Result<Integrity, SignError> {
        if !exchange.is_valid_at(date) {
            return Err(SignError::NotValidAt(date));
        }
        Ok(Integrity::from_sha256(&canonical_headers(
            exchange.status,
            &exchange.headers,
        )))
    }

    fn keep_non_sxg_preloads(&self) -> bool {
        self.keep_non_sxg_preloads
    }
}
