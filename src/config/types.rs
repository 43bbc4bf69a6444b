use crate::cache::{sxg_file_mapping, AddBaseDir, AppendExt, Then, UsePhysicalUrlPath};
use crate::html::{HtmlConfig, HtmlTaskSet};
use crate::packager::{FetchConfig, DEFAULT_USER_AGENT};
use crate::processor::{PreverifyConfig, ProcessorConfig, MAX_CONTENT_LENGTH, STATEFUL_HEADERS};
use crate::resource::{FixedLifetime, MAX_LIFETIME_DAYS};
use crate::url::{
    any_of, default_physical_url_rule, has_hostname_suffix, AppendExtDotUnixTime, RuleSequence,
    UrlMatcher, DEFAULT_VALIDITY_EXTENSION,
};
use crate::{ConfigError, ConfigResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for sxg-packager
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub preverify: PreverifySection,
    #[serde(default)]
    pub html: HtmlSection,
    #[serde(default)]
    pub processor: ProcessorSection,
    #[serde(default)]
    pub url: UrlSection,
    #[serde(default)]
    pub exchange: ExchangeSection,
    /// Where signed exchanges are written; nothing is written if absent
    #[serde(default)]
    pub output: Option<OutputSection>,
}

/// `[fetch]`: how resources are requested
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSection {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(
        rename = "connect-timeout-secs",
        default = "default_connect_timeout_secs"
    )]
    pub connect_timeout_secs: u64,

    #[serde(rename = "https-only", default = "default_true")]
    pub https_only: bool,

    /// Extra headers sent with every request
    #[serde(rename = "request-headers", default)]
    pub request_headers: BTreeMap<String, String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            https_only: true,
            request_headers: BTreeMap::new(),
        }
    }
}

/// `[preverify]`: what makes a response signable
#[derive(Debug, Clone, Deserialize)]
pub struct PreverifySection {
    #[serde(rename = "max-content-length", default = "default_max_content_length")]
    pub max_content_length: usize,

    #[serde(rename = "strict-status", default = "default_true")]
    pub strict_status: bool,

    #[serde(rename = "forbidden-headers", default = "default_forbidden_headers")]
    pub forbidden_headers: Vec<String>,

    /// Hostname suffixes a response URL must match, e.g. `example.org`
    #[serde(rename = "allowed-hostnames", default)]
    pub allowed_hostnames: Option<Vec<String>>,
}

impl Default for PreverifySection {
    fn default() -> Self {
        Self {
            max_content_length: MAX_CONTENT_LENGTH,
            strict_status: true,
            forbidden_headers: default_forbidden_headers(),
            allowed_hostnames: None,
        }
    }
}

/// `[html]`
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlSection {
    #[serde(rename = "task-set", default)]
    pub task_set: HtmlTaskSet,

    #[serde(rename = "modify-html", default)]
    pub modify_html: bool,

    #[serde(rename = "sub-content-types", default = "default_true")]
    pub sub_content_types: bool,
}

impl Default for HtmlSection {
    fn default() -> Self {
        Self {
            task_set: HtmlTaskSet::default(),
            modify_html: false,
            sub_content_types: true,
        }
    }
}

/// `[processor]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessorSection {
    /// Package only sub-resources on the origin of the resource preloading them
    #[serde(rename = "same-origin-only", default)]
    pub same_origin_only: bool,
}

/// `[url]`: physical and validity URL rules
#[derive(Debug, Clone, Deserialize)]
pub struct UrlSection {
    #[serde(rename = "index-file", default = "default_index_file")]
    pub index_file: String,

    #[serde(rename = "validity-extension", default = "default_validity_extension")]
    pub validity_extension: String,
}

impl Default for UrlSection {
    fn default() -> Self {
        Self {
            index_file: default_index_file(),
            validity_extension: default_validity_extension(),
        }
    }
}

/// `[exchange]`
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSection {
    /// Lifetime of signed exchanges, at most seven days
    #[serde(rename = "lifetime-days", default = "default_lifetime_days")]
    pub lifetime_days: i64,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            lifetime_days: MAX_LIFETIME_DAYS,
        }
    }
}

/// `[output]`
#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    pub directory: String,

    #[serde(rename = "sxg-extension", default = "default_sxg_extension")]
    pub sxg_extension: String,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_content_length() -> usize {
    MAX_CONTENT_LENGTH
}

fn default_forbidden_headers() -> Vec<String> {
    STATEFUL_HEADERS.iter().map(|h| h.to_string()).collect()
}

fn default_index_file() -> String {
    "index.html".to_string()
}

fn default_validity_extension() -> String {
    DEFAULT_VALIDITY_EXTENSION.to_string()
}

fn default_lifetime_days() -> i64 {
    MAX_LIFETIME_DAYS
}

fn default_sxg_extension() -> String {
    crate::cache::DEFAULT_SXG_EXTENSION.to_string()
}

impl Config {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.fetch.user_agent.clone(),
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            connect_timeout: Duration::from_secs(self.fetch.connect_timeout_secs),
            https_only: self.fetch.https_only,
            max_body_length: self.preverify.max_content_length,
        }
    }

    /// `[fetch.request-headers]` as a header map
    pub fn request_headers(&self) -> ConfigResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.fetch.request_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigError::InvalidHeader(format!("bad header name '{}'", name)))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                ConfigError::InvalidHeader(format!("bad value for header '{}'", name))
            })?;
            headers.append(name, value);
        }
        Ok(headers)
    }

    /// The matcher built from `allowed-hostnames`, if any
    pub fn url_matcher(&self) -> Option<UrlMatcher> {
        self.preverify.allowed_hostnames.as_ref().map(|names| {
            any_of(
                names
                    .iter()
                    .map(|n| has_hostname_suffix(n.as_str()))
                    .collect(),
            )
        })
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        let mut config = ProcessorConfig::default();
        config.preverify = PreverifyConfig {
            max_content_length: self.preverify.max_content_length,
            strict_status: self.preverify.strict_status,
            forbidden_headers: self
                .preverify
                .forbidden_headers
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            url_matcher: self.url_matcher(),
        };
        config.html = HtmlConfig {
            task_set: self.html.task_set,
            modify_html: self.html.modify_html,
            sub_content_types: self.html.sub_content_types,
        };
        config.same_origin_only = self.processor.same_origin_only;
        config
    }

    pub fn physical_url_rule(&self) -> RuleSequence {
        default_physical_url_rule(&self.url.index_file)
    }

    pub fn validity_url_rule(&self) -> AppendExtDotUnixTime {
        AppendExtDotUnixTime::new(self.url.validity_extension.as_str())
    }

    pub fn valid_period_rule(&self) -> FixedLifetime {
        FixedLifetime(chrono::Duration::days(self.exchange.lifetime_days))
    }

    /// Path mapping for signed exchange files, if `[output]` is set
    pub fn sxg_path_mapping(&self) -> Option<Then<Then<UsePhysicalUrlPath, AppendExt>, AddBaseDir>> {
        self.output
            .as_ref()
            .map(|out| sxg_file_mapping(&out.directory, &out.sxg_extension))
    }
}
