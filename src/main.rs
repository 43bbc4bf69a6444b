//! sxg-packager main entry point
//!
//! Previews what the packager would do for a set of URLs: each URL is
//! fetched and processed, and the resulting `Link` header, preloads and
//! sub-resources are printed. Nothing is signed.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;
use sxg_packager::config::{load_config, Config};
use sxg_packager::exchange::{Exchange, ExchangeFactory, Integrity, SignError};
use sxg_packager::packager::Inspection;
use sxg_packager::url::normalize_url;
use sxg_packager::{Packager, Response, ValidPeriod};
use tracing_subscriber::EnvFilter;
use url::Url;

/// sxg-packager: packages web resources into signed exchanges
///
/// Fetches each URL, checks that it could be signed, and shows which
/// sub-resources would be packaged along with it.
#[derive(Parser, Debug)]
#[command(name = "sxg-packager")]
#[command(version)]
#[command(about = "Previews signed exchange packaging", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to preview
    #[arg(value_name = "URL", required_unless_present = "dry_run")]
    urls: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and print it without fetching anything
    #[arg(long)]
    dry_run: bool,
}

/// Factory for preview runs, which never sign
struct PreviewFactory;

#[async_trait]
impl ExchangeFactory for PreviewFactory {
    async fn new_exchange(
        &self,
        _response: &Response,
        _valid_period: &ValidPeriod,
        _validity_url: &Url,
    ) -> Result<Exchange, SignError> {
        Err(SignError::Signing("preview does not sign".to_string()))
    }

    async fn verify(
        &self,
        _exchange: &Exchange,
        _date: DateTime<Utc>,
    ) -> Result<Integrity, SignError> {
        Err(SignError::Verification("preview does not sign".to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    if cli.dry_run {
        print_config(&config);
        return Ok(());
    }

    let packager = Packager::builder(PreviewFactory)
        .configure(&config)?
        .build()?;

    let mut failures = 0;
    for raw in &cli.urls {
        let url = match normalize_url(raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Skipping {}: {}", raw, e);
                failures += 1;
                continue;
            }
        };

        match packager.inspect(url).await {
            Ok(inspection) => print_inspection(&inspection),
            Err(e) => {
                tracing::error!("error with processing {}: {}", e.url(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} URLs cannot be packaged", failures, cli.urls.len());
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sxg_packager=info,warn"),
            1 => EnvFilter::new("sxg_packager=debug,info"),
            2 => EnvFilter::new("sxg_packager=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn print_config(config: &Config) {
    println!("=== sxg-packager Dry Run ===\n");

    println!("Fetch:");
    println!("  User agent: {}", config.fetch.user_agent);
    println!(
        "  Timeouts: {}s (connect {}s)",
        config.fetch.timeout_secs, config.fetch.connect_timeout_secs
    );
    println!("  HTTPS only: {}", config.fetch.https_only);
    for (name, value) in &config.fetch.request_headers {
        println!("  Header: {}: {}", name, value);
    }

    println!("\nPreverify:");
    println!(
        "  Max content length: {} bytes",
        config.preverify.max_content_length
    );
    println!("  Strict status: {}", config.preverify.strict_status);
    println!(
        "  Forbidden headers: {}",
        config.preverify.forbidden_headers.join(", ")
    );
    match &config.preverify.allowed_hostnames {
        Some(names) => println!("  Allowed hostnames: {}", names.join(", ")),
        None => println!("  Allowed hostnames: any"),
    }

    println!("\nProcessing:");
    println!("  HTML task set: {}", config.html.task_set.as_str());
    println!("  Modify HTML: {}", config.html.modify_html);
    println!("  Same origin only: {}", config.processor.same_origin_only);

    println!("\nURLs:");
    println!("  Index file: {}", config.url.index_file);
    println!("  Validity extension: {}", config.url.validity_extension);
    println!("  Exchange lifetime: {} days", config.exchange.lifetime_days);

    println!("\nOutput:");
    match &config.output {
        Some(output) => println!(
            "  Directory: {} (*{})",
            output.directory, output.sxg_extension
        ),
        None => println!("  None (exchanges are kept in memory)"),
    }

    println!("\n✓ Configuration is valid");
}

fn print_inspection(inspection: &Inspection) {
    let Inspection { resource, response } = inspection;

    println!("{}", resource.request_url());
    if let Some(physical) = resource.physical_url() {
        println!("  Physical URL: {}", physical);
    }
    if let Some(validity) = resource.validity_url() {
        println!("  Validity URL: {}", validity);
    }
    println!(
        "  Status: {}, {} ({} bytes)",
        response.status,
        response.media_type().unwrap_or_else(|| "unknown".to_string()),
        response.payload.len()
    );

    if response.preloads.is_empty() {
        println!("  No preloads");
    }
    for preload in &response.preloads {
        println!("  Preload: {}", preload.to_link_value());
        if preload.resources().is_empty() {
            println!("    not packaged");
        }
        for sub in preload.resources() {
            println!("    packages {}", sub);
        }
    }
}
