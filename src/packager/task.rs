//! Packaging task runner
//!
//! One [`TaskRunner`] drives a single packaging run: the entry resource and,
//! depth first, every sub-resource its preloads name. Each resource goes
//! through
//!
//! ```text
//! New -> Fetching -> Processing -> Recursing -> Signing -> Storing -> Done
//!  \-> Reused (valid exchange already cached)
//! ```
//!
//! Sub-resources are packaged before their parent is signed, so that the
//! parent's `Link` header can carry their header integrity.

use super::errors::ErrorBundle;
use super::fetcher::{FetchRequest, HttpResponse};
use super::Packager;
use crate::cache::CacheKey;
use crate::exchange::Integrity;
use crate::preload::allowed_alt_sxg_value;
use crate::processor::{ProcessorError, Response};
use crate::resource::{Resource, ResourceError, TaskState, ValidPeriod};
use crate::url::normalize;
use crate::PackagerError;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, LINK, LOCATION};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use url::Url;

type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<Outcome, PackagerError>> + Send + 'a>>;

/// How a task ended successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Packaged,
    Reused,
    /// Already visited during this run
    Visited,
}

/// A fetched and processed response, ready to be signed
///
/// The resource has its physical and validity URLs set.
#[derive(Debug)]
pub struct Inspection {
    pub resource: Resource,
    pub response: Response,
}

/// Drives one packaging run
pub(crate) struct TaskRunner<'p> {
    packager: &'p Packager,
    period: ValidPeriod,
    visited: HashSet<CacheKey>,
    errors: ErrorBundle,
}

impl<'p> TaskRunner<'p> {
    pub fn new(packager: &'p Packager, period: ValidPeriod) -> Self {
        Self {
            packager,
            period,
            visited: HashSet::new(),
            errors: ErrorBundle::new(),
        }
    }

    /// Packages the resource of `request` and everything it preloads
    ///
    /// Returns every error of the run, the entry resource's own error last.
    pub async fn run(mut self, request: FetchRequest) -> ErrorBundle {
        let url = request.url.clone();
        match self.package(request).await {
            Ok(outcome) => tracing::debug!("Run for {} finished: {:?}", url, outcome),
            Err(e) => {
                tracing::warn!("Failed to package {}: {}", e.url(), e);
                self.errors.push(e);
            }
        }
        self.errors
    }

    fn package(&mut self, request: FetchRequest) -> TaskFuture<'_> {
        Box::pin(async move {
            let packager = self.packager;
            let url = request.url.clone();
            let key = packager.resource_cache.key(&request);
            if !self.visited.insert(key.clone()) {
                tracing::debug!("{} already visited in this run", key);
                return Ok(Outcome::Visited);
            }

            let mut state = TaskState::New;
            if self.reuse_cached(&key).await? {
                advance(&mut state, TaskState::Reused, &url)?;
                tracing::info!("Reusing cached exchange for {}", url);
                return Ok(Outcome::Reused);
            }

            advance(&mut state, TaskState::Fetching, &url)?;
            let result = self.package_fresh(&mut state, &key, request).await;
            if result.is_err() {
                tracing::debug!("{}: {} -> {}", url, state, TaskState::Failed);
            }
            result
        })
    }

    /// Returns true if a cached exchange for `key` verifies at the signing date
    async fn reuse_cached(&self, key: &CacheKey) -> Result<bool, PackagerError> {
        let packager = self.packager;
        let cached = packager
            .resource_cache
            .lookup(key)
            .await
            .map_err(|source| PackagerError::Cache {
                url: key.url().clone(),
                source,
            })?;

        let Some(exchange) = cached.as_ref().and_then(Resource::exchange) else {
            return Ok(false);
        };
        match packager
            .exchange_factory
            .verify(exchange, self.period.date())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::debug!("Cached exchange for {} is stale, refetching: {}", key, e);
                Ok(false)
            }
        }
    }

    async fn package_fresh(
        &mut self,
        state: &mut TaskState,
        key: &CacheKey,
        request: FetchRequest,
    ) -> Result<Outcome, PackagerError> {
        let packager = self.packager;
        let url = request.url.clone();

        let fetched = fetch(packager, &request).await?;
        advance(state, TaskState::Processing, &url)?;
        let Inspection {
            mut resource,
            mut response,
        } = process(packager, fetched, self.period.date())?;

        advance(state, TaskState::Recursing, &url)?;
        let targets: Vec<Url> = response
            .preloads
            .iter()
            .flat_map(|p| p.resources().iter().cloned())
            .collect();
        for target in targets {
            if packager.cancel.is_cancelled() {
                tracing::info!("Packaging cancelled; not packaging {}", target);
                continue;
            }
            let target = match normalize(target.clone()) {
                Ok(target) => target,
                Err(e) => {
                    tracing::warn!("Skipping sub-resource {} of {}: {}", target, url, e);
                    continue;
                }
            };
            if let Err(e) = self.package(request.for_url(target)).await {
                tracing::warn!("Failed to package sub-resource {}: {}", e.url(), e);
                self.errors.push(e);
            }
        }

        advance(state, TaskState::Signing, &url)?;
        self.attach_link_header(&request, &mut response).await?;
        let validity_url = resource
            .validity_url()
            .cloned()
            .ok_or_else(|| invalid_state(&url, ResourceError::Missing("validity URL")))?;
        let exchange = packager
            .exchange_factory
            .new_exchange(&response, &self.period, &validity_url)
            .await
            .map_err(|source| PackagerError::Sign {
                url: url.clone(),
                source,
            })?;
        let integrity = packager
            .exchange_factory
            .verify(&exchange, self.period.date())
            .await
            .map_err(|source| PackagerError::Sign {
                url: url.clone(),
                source,
            })?;

        advance(state, TaskState::Storing, &url)?;
        resource
            .set_exchange(exchange, integrity)
            .map_err(|e| invalid_state(&url, e))?;
        packager
            .resource_cache
            .store(key, &resource)
            .await
            .map_err(|source| PackagerError::Cache {
                url: url.clone(),
                source,
            })?;

        advance(state, TaskState::Done, &url)?;
        tracing::info!("Packaged {}", url);
        Ok(Outcome::Packaged)
    }

    /// Appends `allowed-alt-sxg` and `preload` entries to the `Link` header
    async fn attach_link_header(
        &self,
        request: &FetchRequest,
        response: &mut Response,
    ) -> Result<(), PackagerError> {
        let keep_non_sxg = self.packager.exchange_factory.keep_non_sxg_preloads();
        let mut values: Vec<String> = response
            .headers
            .get_all(LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        for preload in &response.preloads {
            let mut alternates = Vec::new();
            let mut all_packaged = true;
            for target in preload.integrity_targets() {
                match self.integrity_of(request, target).await? {
                    Some(integrity) => alternates.push(allowed_alt_sxg_value(target, &integrity)),
                    None => all_packaged = false,
                }
            }

            let entry = preload.to_link_value();
            if HeaderValue::from_str(&entry).is_err() {
                // Attribute text copied from HTML may hold newlines
                tracing::warn!(
                    "Dropping preload of {} from {}: not a valid Link value",
                    preload.url(),
                    response.url
                );
                continue;
            }

            if all_packaged {
                values.extend(alternates);
                values.push(entry);
            } else if keep_non_sxg {
                values.push(entry);
            } else {
                tracing::debug!(
                    "Dropping preload of {} from {}: not packaged",
                    preload.url(),
                    response.url
                );
            }
        }

        if values.is_empty() {
            return Ok(());
        }
        let value = HeaderValue::from_str(&values.join(",")).map_err(|e| {
            PackagerError::from_processor(
                response.url.clone(),
                ProcessorError::InvalidHeader(format!("Link: {}", e)),
            )
        })?;
        response.headers.insert(LINK, value);
        Ok(())
    }

    /// Header integrity of the cached exchange for `target`, if it is valid
    async fn integrity_of(
        &self,
        request: &FetchRequest,
        target: &Url,
    ) -> Result<Option<Integrity>, PackagerError> {
        let Ok(target) = normalize(target.clone()) else {
            return Ok(None);
        };
        let packager = self.packager;
        let key = packager.resource_cache.key(&request.for_url(target));
        let cached = packager
            .resource_cache
            .lookup(&key)
            .await
            .map_err(|source| PackagerError::Cache {
                url: key.url().clone(),
                source,
            })?;

        let Some(exchange) = cached.as_ref().and_then(Resource::exchange) else {
            return Ok(None);
        };
        Ok(packager
            .exchange_factory
            .verify(exchange, self.period.date())
            .await
            .ok())
    }
}

/// Fetches `request` and runs the response through the processor
pub(crate) async fn prepare(
    packager: &Packager,
    request: &FetchRequest,
    date: DateTime<Utc>,
) -> Result<Inspection, PackagerError> {
    let fetched = fetch(packager, request).await?;
    process(packager, fetched, date)
}

/// A response fetched for a resource
pub(crate) struct Fetched {
    resource: Resource,
    response: HttpResponse,
}

async fn fetch(packager: &Packager, request: &FetchRequest) -> Result<Fetched, PackagerError> {
    let url = request.url.clone();
    let mut resource = Resource::new(url.clone());

    let response = packager
        .fetch_client
        .fetch(request)
        .await
        .map_err(|source| PackagerError::Fetch {
            url: url.clone(),
            source,
        })?;

    if response.is_redirect() {
        let location = response
            .headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if let Ok(target) = url.join(&location) {
            resource
                .set_redirect_url(target)
                .map_err(|e| invalid_state(&url, e))?;
            tracing::debug!(
                "{} redirects to {}",
                url,
                resource.redirect_url().map_or("", Url::as_str)
            );
        }
        return Err(PackagerError::Redirect { url, location });
    }

    Ok(Fetched { resource, response })
}

fn process(
    packager: &Packager,
    fetched: Fetched,
    date: DateTime<Utc>,
) -> Result<Inspection, PackagerError> {
    let Fetched {
        mut resource,
        response: http,
    } = fetched;
    let url = resource.request_url().clone();

    let mut physical_url = url.clone();
    packager
        .physical_url_rule
        .rewrite(&mut physical_url, &http.headers);
    let validity_url = packager
        .validity_url_rule
        .validity_url(&physical_url, &http.headers, date)
        .map_err(|source| PackagerError::ValidityUrl {
            url: url.clone(),
            source,
        })?;
    resource
        .set_physical_url(physical_url)
        .map_err(|e| invalid_state(&url, e))?;
    resource
        .set_validity_url(validity_url)
        .map_err(|e| invalid_state(&url, e))?;

    let mut response = Response::new(url.clone(), http.status, http.headers, http.body);
    packager
        .processor
        .process(&mut response)
        .map_err(|e| PackagerError::from_processor(url, e))?;

    Ok(Inspection { resource, response })
}

fn advance(state: &mut TaskState, next: TaskState, url: &Url) -> Result<(), PackagerError> {
    if !state.can_transition_to(next) {
        return Err(invalid_state(
            url,
            ResourceError::InvalidTransition {
                from: *state,
                to: next,
            },
        ));
    }
    tracing::debug!("{}: {} -> {}", url, state, next);
    *state = next;
    Ok(())
}

fn invalid_state(url: &Url, source: ResourceError) -> PackagerError {
    PackagerError::InvalidState {
        url: url.clone(),
        source,
    }
}
