//! Packager: the public entry point
//!
//! This module ties the pieces together:
//! - Fetching resources through a [`FetchClient`]
//! - Running them through the processor pipeline
//! - Packaging sub-resources depth first
//! - Signing through the [`ExchangeFactory`] and storing in the cache
//! - Collecting per-URL errors into an [`ErrorBundle`]

mod errors;
mod fetcher;
mod task;

pub use errors::ErrorBundle;
pub use fetcher::{
    build_http_client, FetchClient, FetchConfig, FetchError, FetchRequest, HttpResponse,
    ReqwestFetchClient, DEFAULT_USER_AGENT,
};
pub use task::Inspection;

use crate::cache::{FileWriteCache, MemoryCache, ResourceCache};
use crate::config::Config;
use crate::exchange::ExchangeFactory;
use crate::processor::{comprehensive, Processor, ProcessorConfig};
use crate::resource::{FixedLifetime, ValidPeriod, ValidPeriodRule};
use crate::url::{
    default_physical_url_rule, normalize, AppendExtDotUnixTime, PhysicalUrlRule, ValidityUrlRule,
};
use crate::{ConfigResult, PackagerError};
use chrono::Utc;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use task::TaskRunner;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Packages web resources into signed exchanges
///
/// # Example
///
/// ```no_run
/// # async fn example(factory: impl sxg_packager::ExchangeFactory + 'static) {
/// use sxg_packager::Packager;
/// use url::Url;
///
/// let packager = Packager::builder(factory).build().unwrap();
/// let url = Url::parse("https://example.org/hello.html").unwrap();
/// if let Err(errors) = packager.run_now(url).await {
///     eprintln!("{}", errors);
/// }
/// # }
/// ```
pub struct Packager {
    request_headers: HeaderMap,
    fetch_client: Arc<dyn FetchClient>,
    physical_url_rule: Arc<dyn PhysicalUrlRule>,
    validity_url_rule: Arc<dyn ValidityUrlRule>,
    processor: Arc<dyn Processor>,
    exchange_factory: Arc<dyn ExchangeFactory>,
    resource_cache: Arc<dyn ResourceCache>,
    valid_period_rule: Arc<dyn ValidPeriodRule>,
    cancel: CancellationToken,
}

impl Packager {
    /// Starts building a packager around `factory`
    pub fn builder(factory: impl ExchangeFactory + 'static) -> PackagerBuilder {
        PackagerBuilder::new(Arc::new(factory))
    }

    /// Packages `url` and the sub-resources it preloads
    ///
    /// Configured request headers are sent with every fetch. Sub-resources
    /// are packaged before the page that preloads them, so the page's
    /// `Link` header can carry their header integrity. A failed
    /// sub-resource never fails the page.
    ///
    /// # Arguments
    ///
    /// * `url` - The page to package
    /// * `period` - Validity period of every exchange signed in this run
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every resource was packaged or reused from the cache
    /// * `Err(ErrorBundle)` - One error per failed resource, in the order
    ///   they were found
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use sxg_packager::{ExchangeFactory, Packager, ValidPeriod};
    /// # async fn example(factory: impl ExchangeFactory + 'static) -> anyhow::Result<()> {
    /// let packager = Packager::builder(factory).build()?;
    /// let url = url::Url::parse("https://example.org/hello.html")?;
    /// let period = ValidPeriod::with_lifetime(chrono::Utc::now(), chrono::Duration::days(7));
    ///
    /// if let Err(errors) = packager.run(url, period).await {
    ///     eprintln!("{}", errors);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&self, url: Url, period: ValidPeriod) -> Result<(), ErrorBundle> {
        let mut request = FetchRequest::get(url);
        request.headers = self.request_headers.clone();
        self.run_request(request, period).await
    }

    /// Same as [`run`](Self::run) for a pre-built request
    ///
    /// The request's method and headers are used as is, for the entry
    /// resource and every sub-resource.
    pub async fn run_request(
        &self,
        mut request: FetchRequest,
        period: ValidPeriod,
    ) -> Result<(), ErrorBundle> {
        request.url = normalize(request.url.clone()).map_err(|source| {
            ErrorBundle::from(PackagerError::InvalidUrl {
                url: request.url.clone(),
                source,
            })
        })?;

        tracing::info!(
            "Packaging {} valid from {} to {}",
            request.url,
            period.date(),
            period.expires()
        );
        TaskRunner::new(self, period).run(request).await.into_result()
    }

    /// Runs with the validity period the configured rule gives for now
    pub async fn run_now(&self, url: Url) -> Result<(), ErrorBundle> {
        let period = self.valid_period_rule.valid_period(Utc::now());
        self.run(url, period).await
    }

    /// Fetches and processes `url` without signing or recursing
    pub async fn inspect(&self, url: Url) -> Result<Inspection, PackagerError> {
        let url = normalize(url.clone()).map_err(|source| PackagerError::InvalidUrl {
            url: url.clone(),
            source,
        })?;
        let mut request = FetchRequest::get(url);
        request.headers = self.request_headers.clone();
        task::prepare(self, &request, Utc::now()).await
    }

    /// Stops packaging new sub-resources; tasks in progress finish
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn resource_cache(&self) -> &Arc<dyn ResourceCache> {
        &self.resource_cache
    }
}

/// Builder for [`Packager`]
///
/// Every collaborator except the exchange factory has a default.
pub struct PackagerBuilder {
    exchange_factory: Arc<dyn ExchangeFactory>,
    request_headers: HeaderMap,
    fetch_client: Option<Arc<dyn FetchClient>>,
    fetch_config: FetchConfig,
    physical_url_rule: Option<Arc<dyn PhysicalUrlRule>>,
    validity_url_rule: Option<Arc<dyn ValidityUrlRule>>,
    processor: Option<Arc<dyn Processor>>,
    resource_cache: Option<Arc<dyn ResourceCache>>,
    valid_period_rule: Option<Arc<dyn ValidPeriodRule>>,
    cancel: Option<CancellationToken>,
}

impl PackagerBuilder {
    fn new(exchange_factory: Arc<dyn ExchangeFactory>) -> Self {
        Self {
            exchange_factory,
            request_headers: HeaderMap::new(),
            fetch_client: None,
            fetch_config: FetchConfig::default(),
            physical_url_rule: None,
            validity_url_rule: None,
            processor: None,
            resource_cache: None,
            valid_period_rule: None,
            cancel: None,
        }
    }

    /// Headers sent with every fetch started by [`Packager::run`]
    pub fn request_headers(mut self, headers: HeaderMap) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn fetch_client<F: FetchClient + 'static>(mut self, client: Arc<F>) -> Self {
        self.fetch_client = Some(client as Arc<dyn FetchClient>);
        self
    }

    /// Settings of the default fetch client; ignored with a custom client
    pub fn fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch_config = config;
        self
    }

    pub fn physical_url_rule(mut self, rule: impl PhysicalUrlRule + 'static) -> Self {
        self.physical_url_rule = Some(Arc::new(rule));
        self
    }

    pub fn validity_url_rule(mut self, rule: impl ValidityUrlRule + 'static) -> Self {
        self.validity_url_rule = Some(Arc::new(rule));
        self
    }

    pub fn processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn resource_cache<C: ResourceCache + 'static>(mut self, cache: Arc<C>) -> Self {
        self.resource_cache = Some(cache as Arc<dyn ResourceCache>);
        self
    }

    pub fn valid_period_rule(mut self, rule: impl ValidPeriodRule + 'static) -> Self {
        self.valid_period_rule = Some(Arc::new(rule));
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Applies every setting of a loaded configuration
    ///
    /// With an `[output]` section, signed exchanges are also written to
    /// files under its directory.
    pub fn configure(self, config: &Config) -> ConfigResult<Self> {
        let mut builder = self
            .request_headers(config.request_headers()?)
            .fetch_config(config.fetch_config())
            .physical_url_rule(config.physical_url_rule())
            .validity_url_rule(config.validity_url_rule())
            .processor(comprehensive(config.processor_config()))
            .valid_period_rule(config.valid_period_rule());

        if let Some(mapping) = config.sxg_path_mapping() {
            builder = builder.resource_cache(Arc::new(FileWriteCache::new(
                MemoryCache::new(),
                mapping,
            )));
        }
        Ok(builder)
    }

    /// Fills in defaults and builds the packager
    ///
    /// Fails only if the default HTTP client cannot be built.
    pub fn build(self) -> ConfigResult<Packager> {
        let fetch_client: Arc<dyn FetchClient> = match self.fetch_client {
            Some(client) => client,
            None => Arc::new(ReqwestFetchClient::new(&self.fetch_config)?),
        };

        Ok(Packager {
            request_headers: self.request_headers,
            fetch_client,
            physical_url_rule: self
                .physical_url_rule
                .unwrap_or_else(|| Arc::new(default_physical_url_rule("index.html"))),
            validity_url_rule: self
                .validity_url_rule
                .unwrap_or_else(|| Arc::new(AppendExtDotUnixTime::default())),
            processor: self
                .processor
                .unwrap_or_else(|| Arc::new(comprehensive(ProcessorConfig::default()))),
            exchange_factory: self.exchange_factory,
            resource_cache: self
                .resource_cache
                .unwrap_or_else(|| Arc::new(MemoryCache::new())),
            valid_period_rule: self
                .valid_period_rule
                .unwrap_or_else(|| Arc::new(FixedLifetime::default())),
            cancel: self.cancel.unwrap_or_else(CancellationToken::new),
        })
    }
}
