//! Cache traits and error types
//!
//! This module defines the trait interface for resource caches and the
//! fingerprint packaged resources are stored under.

use crate::packager::FetchRequest;
use crate::resource::Resource;
use async_trait::async_trait;
use reqwest::Method;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resource is not packaged: {0}")]
    NotPackaged(Url),

    #[error("Cannot map resource to a file path: {0}")]
    NoPath(String),

    #[error("Cache lock poisoned")]
    Poisoned,

    #[error("Background write failed: {0}")]
    Join(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Fingerprint of a request: method and URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    url: Url,
}

impl CacheKey {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    /// Key of a plain GET for `url`
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn from_request(request: &FetchRequest) -> Self {
        Self::new(request.method.clone(), request.url.clone())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Keyed store of packaged resources
///
/// Storing under an existing key replaces the earlier resource.
/// Implementations are shared between tasks and must be thread-safe.
#[async_trait]
pub trait ResourceCache: Send + Sync {
    /// Derives the key a request is cached under
    ///
    /// Must return equal keys for equal requests.
    fn key(&self, request: &FetchRequest) -> CacheKey {
        CacheKey::from_request(request)
    }

    /// Looks up the resource stored under `key`
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<Resource>>;

    /// Stores a packaged resource under `key`
    async fn store(&self, key: &CacheKey, resource: &Resource) -> CacheResult<()>;
}
