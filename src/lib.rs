//! sxg-packager: packages live web resources into Signed HTTP Exchanges
//!
//! Starting from an entry URL, the packager fetches the resource, checks that
//! it can legally be signed, runs it through a processor pipeline that
//! discovers sub-resources (stylesheets, scripts, preload hints), packages
//! same-origin sub-resources recursively, and hands the result to an
//! [`ExchangeFactory`](exchange::ExchangeFactory) for signing.

pub mod cache;
pub mod config;
pub mod exchange;
pub mod html;
pub mod packager;
pub mod preload;
pub mod processor;
pub mod resource;
pub mod url;

use ::url::Url;
use thiserror::Error;

use crate::cache::CacheError;
use crate::exchange::SignError;
use crate::packager::FetchError;
use crate::processor::{PreverifyError, ProcessorError};
use crate::resource::ResourceError;

/// Error raised while packaging a single resource
///
/// Every variant carries the URL of the resource that failed, so that errors
/// collected from sub-resources can be reported per URL.
#[derive(Debug, Error)]
pub enum PackagerError {
    #[error("failed to fetch: {source}")]
    Fetch { url: Url, source: FetchError },

    #[error("redirected to {location}")]
    Redirect { url: Url, location: String },

    #[error("preverify failed: {source}")]
    Preverify { url: Url, source: PreverifyError },

    #[error("processor failed: {source}")]
    Processor { url: Url, source: ProcessorError },

    #[error("cannot derive validity URL: {source}")]
    ValidityUrl { url: Url, source: UrlError },

    #[error("failed to sign exchange: {source}")]
    Sign { url: Url, source: SignError },

    #[error("cache error: {source}")]
    Cache { url: Url, source: CacheError },

    #[error("invalid URL: {source}")]
    InvalidUrl { url: Url, source: UrlError },

    #[error("{source}")]
    InvalidState { url: Url, source: ResourceError },
}

impl PackagerError {
    /// Returns the URL of the resource this error belongs to
    pub fn url(&self) -> &Url {
        match self {
            Self::Fetch { url, .. }
            | Self::Redirect { url, .. }
            | Self::Preverify { url, .. }
            | Self::Processor { url, .. }
            | Self::ValidityUrl { url, .. }
            | Self::Sign { url, .. }
            | Self::Cache { url, .. }
            | Self::InvalidUrl { url, .. }
            | Self::InvalidState { url, .. } => url,
        }
    }

    /// Wraps a processor failure, keeping preverify rejections distinct
    pub(crate) fn from_processor(url: Url, err: ProcessorError) -> Self {
        match err {
            ProcessorError::Preverify(source) => Self::Preverify { url, source },
            source => Self::Processor { url, source },
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid header in config: {0}")]
    InvalidHeader(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),

    #[error("Missing header: {0}")]
    MissingHeader(String),
}

/// Result type alias for packaging a single resource
pub type Result<T> = std::result::Result<T, PackagerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use exchange::{Exchange, ExchangeFactory, Integrity};
pub use packager::{ErrorBundle, Packager, PackagerBuilder};
pub use preload::Preload;
pub use processor::{Processor, Response};
pub use resource::{Resource, ValidPeriod};
