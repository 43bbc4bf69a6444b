//! Response processing pipeline
//!
//! A [`Processor`] inspects and mutates a [`Response`] before it is signed.
//! Processors compose through [`Sequential`] (run in order, abort on first
//! error) and [`Multiplexed`] (dispatch by media type). The default
//! pipeline built by [`comprehensive`] is:
//!
//! ```text
//! Preverify ▸ EssentialPre ▸ CustomPre ▸ MainMux ▸ SameOrigin ▸ EssentialPost ▸ CustomPost
//! ```
//!
//! where `MainMux` routes `text/html` and `application/xhtml+xml` to the
//! [`HtmlProcessor`](crate::html::HtmlProcessor).

mod essential;
mod preverify;
mod same_origin;

pub use essential::{
    essential_post, essential_pre, ExtractPreloadHeaders, NormalizeContentType,
    StripUnsignableHeaders,
};
pub use preverify::{
    Preverify, PreverifyConfig, PreverifyError, HOP_BY_HOP_HEADERS, MAX_CONTENT_LENGTH,
    STATEFUL_HEADERS,
};
pub use same_origin::SameOrigin;

use crate::html::{HtmlConfig, HtmlProcessor};
use crate::preload::Preload;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use url::Url;

/// Errors raised by processors
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Preverify(#[from] PreverifyError),

    #[error("failed to parse HTML: {0}")]
    HtmlParse(String),

    #[error("unexpected node in HTML tree: {0}")]
    UnexpectedNode(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("{0}")]
    Custom(String),
}

/// Multi-valued string map carrying side-band facts about a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraData(BTreeMap<String, Vec<String>>);

impl ExtraData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value under `key`
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.0.entry(key.to_string()).or_default().push(value.into());
    }

    /// Appends a value unless it is already present; returns true if added
    pub fn add_unique(&mut self, key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        let values = self.0.entry(key.to_string()).or_default();
        if values.contains(&value) {
            return false;
        }
        values.push(value);
        true
    }

    /// All values under `key`, in insertion order
    pub fn get(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

/// An HTTP response under processing
#[derive(Debug, Clone)]
pub struct Response {
    /// Request URL the response was fetched for
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub payload: Vec<u8>,
    /// Preload directives in discovery order
    pub preloads: Vec<Preload>,
    pub extra_data: ExtraData,
}

impl Response {
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, payload: Vec<u8>) -> Self {
        Self {
            url,
            status,
            headers,
            payload,
            preloads: Vec::new(),
            extra_data: ExtraData::new(),
        }
    }

    /// First token of `Content-Type`, lowercased
    pub fn media_type(&self) -> Option<String> {
        let value = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        let media_type = value.split(';').next()?.trim().to_ascii_lowercase();
        (!media_type.is_empty()).then_some(media_type)
    }

    /// Adds a preload unless one for the same URL was already added
    ///
    /// Returns true if the preload was added.
    pub fn add_preload(&mut self, preload: Preload) -> bool {
        if self.preloads.iter().any(|p| p.url() == preload.url()) {
            tracing::debug!("Duplicate preload for {} ignored", preload.url());
            return false;
        }
        self.preloads.push(preload);
        true
    }
}

/// Inspects and mutates a response
///
/// Implementations are shared across tasks and must tolerate concurrent
/// calls.
pub trait Processor: Send + Sync {
    fn process(&self, response: &mut Response) -> Result<(), ProcessorError>;
}

/// Runs child processors in order, aborting on the first error
#[derive(Default)]
pub struct Sequential {
    children: Vec<Box<dyn Processor>>,
}

impl Sequential {
    pub fn new(children: Vec<Box<dyn Processor>>) -> Self {
        Self { children }
    }

    pub fn push(&mut self, child: Box<dyn Processor>) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Processor for Sequential {
    fn process(&self, response: &mut Response) -> Result<(), ProcessorError> {
        for child in &self.children {
            child.process(response)?;
        }
        Ok(())
    }
}

/// Dispatches to a child processor by media type
///
/// A `None` route disables the media type: responses of that type pass
/// through untouched, the same as unrouted types.
#[derive(Default)]
pub struct Multiplexed {
    routes: HashMap<String, Option<Box<dyn Processor>>>,
}

impl Multiplexed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `media_type` to `processor`, replacing any earlier route
    pub fn route(mut self, media_type: &str, processor: Box<dyn Processor>) -> Self {
        self.set(media_type, Some(processor));
        self
    }

    /// Disables `media_type`
    pub fn disable(mut self, media_type: &str) -> Self {
        self.set(media_type, None);
        self
    }

    pub fn set(&mut self, media_type: &str, processor: Option<Box<dyn Processor>>) {
        self.routes
            .insert(media_type.trim().to_ascii_lowercase(), processor);
    }

    /// Returns true if `media_type` routes to a processor
    pub fn handles(&self, media_type: &str) -> bool {
        matches!(
            self.routes.get(&media_type.to_ascii_lowercase()),
            Some(Some(_))
        )
    }
}

impl Processor for Multiplexed {
    fn process(&self, response: &mut Response) -> Result<(), ProcessorError> {
        let Some(media_type) = response.media_type() else {
            return Ok(());
        };
        match self.routes.get(&media_type) {
            Some(Some(processor)) => processor.process(response),
            _ => Ok(()),
        }
    }
}

/// Media types handled by the HTML processor by default
pub const HTML_MEDIA_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Options of the comprehensive pipeline
pub struct ProcessorConfig {
    pub preverify: PreverifyConfig,
    pub html: HtmlConfig,
    /// Keep cross-origin preloads as hints without packaging their targets
    pub same_origin_only: bool,
    main: Vec<(String, Option<Box<dyn Processor>>)>,
    pre: Vec<Box<dyn Processor>>,
    post: Vec<Box<dyn Processor>>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            preverify: PreverifyConfig::default(),
            html: HtmlConfig::default(),
            same_origin_only: false,
            main: Vec::new(),
            pre: Vec::new(),
            post: Vec::new(),
        }
    }
}

impl ProcessorConfig {
    /// Routes `media_type` to a custom main processor, overriding defaults
    pub fn with_main(mut self, media_type: &str, processor: Box<dyn Processor>) -> Self {
        self.main.push((media_type.to_string(), Some(processor)));
        self
    }

    /// Disables main processing of `media_type`
    pub fn without_main(mut self, media_type: &str) -> Self {
        self.main.push((media_type.to_string(), None));
        self
    }

    pub fn with_pre(mut self, processor: Box<dyn Processor>) -> Self {
        self.pre.push(processor);
        self
    }

    pub fn with_post(mut self, processor: Box<dyn Processor>) -> Self {
        self.post.push(processor);
        self
    }
}

/// Builds the default processing pipeline
///
/// Stages run in this order: preverify, essential pre-processing, custom
/// pre-processors, the main processor for the media type, essential
/// post-processing, then custom post-processors. HTML and XHTML go to an
/// [`HtmlProcessor`] unless `config` overrides or disables them.
///
/// # Arguments
///
/// * `config` - Preverify limits, HTML tasks and custom processors
///
/// # Returns
///
/// A [`Sequential`] that stops at the first failing stage
///
/// # Example
///
/// ```
/// use sxg_packager::html::HtmlTaskSet;
/// use sxg_packager::processor::{comprehensive, ProcessorConfig};
///
/// let mut config = ProcessorConfig::default().without_main("application/xhtml+xml");
/// config.html.task_set = HtmlTaskSet::Aggressive;
/// let pipeline = comprehensive(config);
/// assert!(!pipeline.is_empty());
/// ```
pub fn comprehensive(config: ProcessorConfig) -> Sequential {
    let ProcessorConfig {
        preverify,
        html,
        same_origin_only,
        main,
        pre,
        post,
    } = config;

    let mut mux = Multiplexed::new();
    for media_type in HTML_MEDIA_TYPES {
        mux.set(media_type, Some(Box::new(HtmlProcessor::new(&html))));
    }
    for (media_type, processor) in main {
        mux.set(&media_type, processor);
    }

    let mut pipeline = Sequential::new(vec![
        Box::new(Preverify::new(preverify)),
        Box::new(essential_pre()),
    ]);
    for processor in pre {
        pipeline.push(processor);
    }
    pipeline.push(Box::new(mux));
    if same_origin_only {
        pipeline.push(Box::new(SameOrigin));
    }
    pipeline.push(Box::new(essential_post()));
    for processor in post {
        pipeline.push(processor);
    }
    pipeline
}
