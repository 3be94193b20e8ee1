//! Week-by-week orchestration.
//!
//! A run resolves its week keys once, then walks them strictly in order:
//!
//! 1. **Discover** the meal URLs of the week (listing page or sitemap)
//! 2. **Extract** every meal concurrently, up to the configured cap, keeping `None` for failures
//! 3. **Assemble** the [`WeekBatch`] in discovery order
//! 4. **Persist** it through the [`RecordSink`]
//!
//! A failure inside one week is logged and the run moves on to the next week. Only key
//! resolution can abort the run.
//!
//! A week whose discovery yields no meal at all is not persisted: discovery swallows listing
//! failures into an empty list, and writing that list would replace an earlier good file with an
//! empty batch. Such weeks are logged at `warn` with the page they were discovered from and
//! counted as empty in the [`RunSummary`].

use crate::browser::BrowserLauncher;
use crate::config::{LinkSource, VendorConfig};
use crate::dates::{
    closest_sunday, format_date, is_valid_date, is_valid_monday, is_valid_period_key,
    iso_week_key, monday_of_week, mondays_of_month, parse_date, period_keys_of_month,
};
use crate::error::ScrapeError;
use crate::models::WeekBatch;
use crate::outputs::json::{RecordSink, batch_location};
use crate::scrapers::{VendorProtocol, VendorScraper};
use crate::sitemap::{SitemapFetcher, build_url_by_key, fetch_sitemap_urls, menu_urls_for_key};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// What the user asked for: explicit keys, a month, or neither (this week).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRequest {
    pub inputs: Vec<String>,
    /// `(year, month0)`
    pub month: Option<(i32, u32)>,
}

/// Turn a request into the ordered week keys of one run.
///
/// Date-keyed vendors get Mondays (`YYYY-MM-DD`), period-keyed vendors get `YYYY-Www`. Inputs
/// that do not fit are dropped with a warning; a request that leaves nothing is an error.
pub fn resolve_keys(
    protocol: VendorProtocol,
    request: &KeyRequest,
    today: NaiveDate,
) -> Result<Vec<String>, ScrapeError> {
    let period_keyed = protocol.is_period_keyed();
    let mut keys = Vec::new();

    if let Some((year, month0)) = request.month {
        if period_keyed {
            keys.extend(period_keys_of_month(year, month0));
        } else {
            keys.extend(mondays_of_month(year, month0));
        }
    }

    for input in &request.inputs {
        let input = input.trim();
        match (period_keyed, resolve_input(period_keyed, input)) {
            (_, Some(key)) => keys.push(key),
            (true, None) => warn!(input, "Not a date or YYYY-Www week key; skipping"),
            (false, None) if is_valid_date(input) => warn!(input, "Date is not a Monday; skipping"),
            (false, None) => warn!(input, "Not a YYYY-MM-DD date; skipping"),
        }
    }

    if request.inputs.is_empty() && request.month.is_none() {
        let key = if period_keyed {
            iso_week_key(today)
        } else {
            format_date(monday_of_week(today))
        };
        info!(%key, "No dates given; using the current week");
        keys.push(key);
    }

    if keys.is_empty() {
        return Err(ScrapeError::InvalidInput(
            "no valid dates to scrape".to_string(),
        ));
    }
    Ok(keys)
}

fn resolve_input(period_keyed: bool, input: &str) -> Option<String> {
    if !period_keyed {
        return is_valid_monday(input).then(|| input.to_string());
    }
    if is_valid_period_key(input) {
        return Some(input.to_string());
    }
    closest_sunday(input)
        .and_then(|sunday| parse_date(&sunday))
        .map(iso_week_key)
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub weeks_written: usize,
    /// Weeks where discovery found no meals; nothing was written for them.
    pub weeks_empty: usize,
    pub weeks_failed: usize,
    pub meals_scraped: usize,
    pub meals_failed: usize,
}

enum WeekOutcome {
    Written { batch: WeekBatch, path: PathBuf },
    Empty { source: String },
}

/// Everything one vendor run needs, borrowed from `main`.
pub struct Pipeline<'a, L, F, K> {
    vendor_id: &'a str,
    vendor: &'a VendorConfig,
    scraper: VendorScraper<'a, L>,
    fetcher: &'a F,
    sink: &'a K,
    concurrency: usize,
    vendor_dir: bool,
}

impl<'a, L, F, K> Pipeline<'a, L, F, K>
where
    L: BrowserLauncher,
    F: SitemapFetcher,
    K: RecordSink,
{
    pub fn new(
        vendor_id: &'a str,
        vendor: &'a VendorConfig,
        scraper: VendorScraper<'a, L>,
        fetcher: &'a F,
        sink: &'a K,
    ) -> Self {
        Self {
            vendor_id,
            vendor,
            scraper,
            fetcher,
            sink,
            concurrency: 1,
            vendor_dir: true,
        }
    }

    /// Meal pages scraped at once within a week (at least one).
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Nest output under a directory named after the vendor id.
    pub fn vendor_dir(mut self, enabled: bool) -> Self {
        self.vendor_dir = enabled;
        self
    }

    /// Scrape and persist every key in order.
    #[instrument(level = "info", skip(self, keys), fields(vendor = %self.vendor_id, weeks = keys.len()))]
    pub async fn run(&self, keys: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();
        for key in keys {
            match self.run_week(key).await {
                Ok(WeekOutcome::Written { batch, path }) => {
                    summary.weeks_written += 1;
                    summary.meals_scraped += batch.scraped_count();
                    summary.meals_failed += batch.failed_count();
                    info!(
                        date = %key,
                        path = %path.display(),
                        scraped = batch.scraped_count(),
                        failed = batch.failed_count(),
                        "Week complete"
                    );
                }
                Ok(WeekOutcome::Empty { source }) => {
                    summary.weeks_empty += 1;
                    warn!(date = %key, %source, "No meals discovered; nothing written for this week");
                }
                Err(e) => {
                    summary.weeks_failed += 1;
                    error!(date = %key, step = e.step(), error = %e, "Week failed; moving on");
                }
            }
        }
        summary
    }

    #[instrument(level = "info", skip(self))]
    async fn run_week(&self, key: &str) -> Result<WeekOutcome, ScrapeError> {
        let (source, links) = self.discover(key).await?;
        if links.is_empty() {
            return Ok(WeekOutcome::Empty { source });
        }

        let records = stream::iter(links.iter())
            .map(|url| self.scraper.extract_record(url, key))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let batch = WeekBatch::new(key, records);
        let vendor_dir = self.vendor_dir.then_some(self.vendor_id);
        let (dirs, filename) = batch_location(vendor_dir, key);
        let path = self.sink.write(&dirs, &filename, &batch).await?;
        Ok(WeekOutcome::Written { batch, path })
    }

    /// Meal links of one week, with the URL they were read from.
    async fn discover(&self, key: &str) -> Result<(String, Vec<String>), ScrapeError> {
        match self.vendor.link_source {
            LinkSource::Listing => {
                let listing_url = build_url_by_key(&self.vendor.week_menu_url, key);
                let links = self.scraper.discover_links(&listing_url).await;
                Ok((listing_url, links))
            }
            LinkSource::Sitemap => {
                let sitemap_url = &self.vendor.sitemap_url;
                let urls = fetch_sitemap_urls(self.fetcher, sitemap_url).await?;
                let links = menu_urls_for_key(&urls, &self.vendor.menu_path_segment, key);
                info!(count = links.len(), "Sitemap meal links");
                Ok((sitemap_url.clone(), links))
            }
        }
    }
}
