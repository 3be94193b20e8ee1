//! # Meal Nutrition Scraper
//!
//! Scrapes the weekly menus of meal-kit vendors and stores the nutrition facts of every meal as
//! one JSON file per week.
//!
//! ## Features
//!
//! - Discovers a week's meals from the vendor's listing page or its sitemap
//! - Drives a headless Chromium to reveal nutrition panels that only render after clicks
//!   (serving-size toggles, "load more" pagination)
//! - Parses three page layouts: multi-column tables, per-serving tabs, single-serving label lists
//! - Keeps a `null` placeholder for every meal that could not be scraped
//!
//! ## Usage
//!
//! ```sh
//! meal_nutrition_scraper --vendor wecook 2024-08-05 -o ./data
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture, one week at a time:
//! 1. **Resolve**: turn arguments into week keys (Mondays or `YYYY-Www`)
//! 2. **Discover**: list the meal URLs of the week
//! 3. **Extract**: scrape every meal page in parallel, one browser per page
//! 4. **Output**: write the week's batch to `{output}/{vendor}/{bucket}/{key}.json`

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod browser;
mod cli;
mod config;
mod dates;
mod error;
mod models;
mod outputs;
mod pipeline;
mod retry;
mod scrapers;
mod sitemap;
mod utils;

use browser::chrome::ChromeLauncher;
use cli::Cli;
use config::AppConfig;
use error::ScrapeError;
use outputs::json::JsonFileSink;
use pipeline::{KeyRequest, Pipeline, resolve_keys};
use scrapers::VendorScraper;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("meal_nutrition_scraper starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Load config & select vendor ----
    let mut config = AppConfig::load(args.config.as_deref()).await?;
    if let Some(concurrency) = args.concurrency {
        config.scrape.concurrency = concurrency;
    }
    if let Some(retries) = args.retries {
        config.scrape.retry_attempts = retries;
    }
    if args.headful {
        config.scrape.headless = false;
    }

    let vendor = match config.vendor(&args.vendor) {
        Ok(vendor) => vendor,
        Err(e) => {
            error!(vendor = %args.vendor, error = %e, "Vendor selection failed");
            return Err(e.into());
        }
    };
    info!(vendor = %vendor.name, protocol = ?vendor.protocol, "Selected vendor");

    // ---- Resolve week keys ----
    let month = match args.month.as_deref() {
        Some(month) => Some(dates::parse_month(month).ok_or_else(|| {
            ScrapeError::InvalidInput(format!("--month must be YYYY-MM, got `{month}`"))
        })?),
        None => None,
    };
    let request = KeyRequest {
        inputs: args.dates.clone(),
        month,
    };
    let today = dates::today_in(vendor.offset()?);
    let keys = match resolve_keys(vendor.protocol, &request, today) {
        Ok(keys) => keys,
        Err(e) => {
            error!(error = %e, "No weeks to scrape; aborting");
            return Err(e.into());
        }
    };
    info!(weeks = keys.len(), first = %keys[0], "Resolved weeks");

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Scrape ----
    let launcher = ChromeLauncher::new(config.scrape.browser_settings());
    let http = reqwest::Client::builder()
        .user_agent(concat!("meal_nutrition_scraper/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let sink = JsonFileSink::new(&args.output_dir);
    let scraper = VendorScraper::new(
        &launcher,
        vendor.protocol,
        config.scrape.settle(),
        config.scrape.load_more_limits(),
        config.scrape.retry_policy(),
    );

    let summary = Pipeline::new(&args.vendor, vendor, scraper, &http, &sink)
        .concurrency(config.scrape.concurrency)
        .vendor_dir(!args.no_vendor_dir)
        .run(&keys)
        .await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        vendor = %vendor.name,
        weeks_written = summary.weeks_written,
        weeks_empty = summary.weeks_empty,
        weeks_failed = summary.weeks_failed,
        meals_scraped = summary.meals_scraped,
        meals_failed = summary.meals_failed,
        "Execution complete"
    );

    Ok(())
}
