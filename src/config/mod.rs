//! Configuration module for sxg-packager
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and converting them into the packager's settings.
//!
//! # Example
//!
//! ```no_run
//! use sxg_packager::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("packager.toml")).unwrap();
//! println!("Requests time out after {}s", config.fetch.timeout_secs);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, ExchangeSection, FetchSection, HtmlSection, OutputSection, PreverifySection,
    ProcessorSection, UrlSection,
};

pub use parser::{load_config, parse_config};
pub use validation::validate;
