//! Resources and validity periods
//!
//! A [`Resource`] is the unit of packaging: the URL a caller asked for, the
//! URLs derived from it, and the signed exchange once packaging succeeds.
//!
//! # Components
//!
//! - `Resource`: one packaged (or failed) URL
//! - `ValidPeriod`: the window during which exchanges of one run are valid
//! - `TaskState`: the per-resource packaging state machine

mod state;

pub use state::TaskState;

use crate::exchange::{Exchange, Integrity};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Maximum lifetime of a signed exchange
pub const MAX_LIFETIME_DAYS: i64 = 7;

/// Errors raised when a resource is driven out of order
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource is already packaged; {0} can no longer change")]
    Frozen(&'static str),

    #[error("{0} must be set before the exchange")]
    Missing(&'static str),

    #[error("resource was redirected to {0}")]
    Redirected(Url),

    #[error("invalid task state transition: {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },
}

/// The unit of packaging
///
/// Exactly one of "packaged" (an exchange is present), "redirected" or
/// "unsuccessful" holds. The physical and validity URLs are set before the
/// exchange, and none of the URLs change once the exchange is set.
#[derive(Debug, Clone)]
pub struct Resource {
    request_url: Url,
    physical_url: Option<Url>,
    validity_url: Option<Url>,
    redirect_url: Option<Url>,
    exchange: Option<Arc<Exchange>>,
    integrity: Option<Integrity>,
}

impl Resource {
    pub fn new(request_url: Url) -> Self {
        Self {
            request_url,
            physical_url: None,
            validity_url: None,
            redirect_url: None,
            exchange: None,
            integrity: None,
        }
    }

    pub fn request_url(&self) -> &Url {
        &self.request_url
    }

    pub fn physical_url(&self) -> Option<&Url> {
        self.physical_url.as_ref()
    }

    pub fn validity_url(&self) -> Option<&Url> {
        self.validity_url.as_ref()
    }

    pub fn redirect_url(&self) -> Option<&Url> {
        self.redirect_url.as_ref()
    }

    pub fn exchange(&self) -> Option<&Arc<Exchange>> {
        self.exchange.as_ref()
    }

    pub fn integrity(&self) -> Option<&Integrity> {
        self.integrity.as_ref()
    }

    /// Returns true once the resource carries a signed exchange
    pub fn is_packaged(&self) -> bool {
        self.exchange.is_some()
    }

    pub fn set_physical_url(&mut self, url: Url) -> Result<(), ResourceError> {
        if self.exchange.is_some() {
            return Err(ResourceError::Frozen("physical URL"));
        }
        self.physical_url = Some(url);
        Ok(())
    }

    pub fn set_validity_url(&mut self, url: Url) -> Result<(), ResourceError> {
        if self.exchange.is_some() {
            return Err(ResourceError::Frozen("validity URL"));
        }
        self.validity_url = Some(url);
        Ok(())
    }

    pub fn set_redirect_url(&mut self, url: Url) -> Result<(), ResourceError> {
        if self.exchange.is_some() {
            return Err(ResourceError::Frozen("redirect URL"));
        }
        self.redirect_url = Some(url);
        Ok(())
    }

    /// Attaches the signed exchange and its header integrity
    pub fn set_exchange(
        &mut self,
        exchange: Exchange,
        integrity: Integrity,
    ) -> Result<(), ResourceError> {
        if let Some(redirect) = &self.redirect_url {
            return Err(ResourceError::Redirected(redirect.clone()));
        }
        if self.physical_url.is_none() {
            return Err(ResourceError::Missing("physical URL"));
        }
        if self.validity_url.is_none() {
            return Err(ResourceError::Missing("validity URL"));
        }
        if self.exchange.is_some() {
            return Err(ResourceError::Frozen("exchange"));
        }
        self.exchange = Some(Arc::new(exchange));
        self.integrity = Some(integrity);
        Ok(())
    }
}

/// When a signed exchange is valid: from `date` until `expires`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidPeriod {
    date: DateTime<Utc>,
    expires: DateTime<Utc>,
}

impl ValidPeriod {
    pub fn new(date: DateTime<Utc>, expires: DateTime<Utc>) -> Self {
        Self { date, expires }
    }

    pub fn with_lifetime(date: DateTime<Utc>, lifetime: Duration) -> Self {
        Self::new(date, date + lifetime)
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn lifetime(&self) -> Duration {
        self.expires - self.date
    }

    /// Returns true if `date` lies in `[date, expires)`
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.date <= date && date < self.expires
    }
}

/// Computes the validity period for a run started at `now`
pub trait ValidPeriodRule: Send + Sync {
    fn valid_period(&self, now: DateTime<Utc>) -> ValidPeriod;
}

/// Valid from `now` for a fixed lifetime
#[derive(Debug, Clone, Copy)]
pub struct FixedLifetime(pub Duration);

impl Default for FixedLifetime {
    fn default() -> Self {
        Self(Duration::days(MAX_LIFETIME_DAYS))
    }
}

impl ValidPeriodRule for FixedLifetime {
    fn valid_period(&self, now: DateTime<Utc>) -> ValidPeriod {
        ValidPeriod::with_lifetime(now, self.0)
    }
}
