//! Vendor scrapers for weekly menus and nutrition facts.
//!
//! Each vendor module follows the same two-phase pattern:
//!
//! 1. **Discovery**: list the meal page URLs of one week
//! 2. **Extraction**: turn one meal page into a [`NutritionRecord`]
//!
//! # Protocols
//!
//! | Protocol | Discovery | Extraction | Vendor |
//! |----------|-----------|------------|--------|
//! | [`VendorProtocol::StaticTable`] | date-keyed listing | multi-serving `<table>` | We-Cook (legacy pages) |
//! | [`VendorProtocol::InteractiveTabs`] | date-keyed listing | one click per serving toggle | We-Cook |
//! | [`VendorProtocol::PaginatedCards`] | "load more" listing | single-serving label list | Factor |
//!
//! The protocol is picked once per run and handed to a [`VendorScraper`]; nothing below this
//! module branches on the vendor again.
//!
//! # Failure contract
//!
//! Every scrape owns one browser session and closes it on every path. Discovery failures are
//! logged and yield no links; extraction failures are logged and yield `None`, which the caller
//! keeps as a placeholder.

pub mod factor;
pub mod normalize;
pub mod wecook;

use crate::browser::BrowserLauncher;
use crate::error::ScrapeError;
use crate::models::{NutritionRecord, Servings};
use crate::retry::RetryPolicy;
use crate::utils::{id_and_name_from_slug, url_slug};
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorProtocol {
    StaticTable,
    InteractiveTabs,
    PaginatedCards,
}

impl VendorProtocol {
    /// Menus addressed by `YYYY-Www` instead of a Monday date.
    pub fn is_period_keyed(self) -> bool {
        matches!(self, Self::PaginatedCards)
    }
}

/// Bounds for the "load more" loop of paginated listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadMoreLimits {
    pub max_clicks: usize,
    pub deadline: Duration,
    /// Wait after each click for new cards to render.
    pub settle: Duration,
}

/// Protocol-bound scraper for one vendor.
#[derive(Debug)]
pub struct VendorScraper<'a, L> {
    launcher: &'a L,
    protocol: VendorProtocol,
    settle: Duration,
    load_more: LoadMoreLimits,
    retry: RetryPolicy,
}

impl<'a, L: BrowserLauncher> VendorScraper<'a, L> {
    pub fn new(
        launcher: &'a L,
        protocol: VendorProtocol,
        settle: Duration,
        load_more: LoadMoreLimits,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            launcher,
            protocol,
            settle,
            load_more,
            retry,
        }
    }

    /// Meal URLs listed on a week's listing page; empty when the page cannot be scraped.
    #[instrument(level = "info", skip(self), fields(protocol = ?self.protocol))]
    pub async fn discover_links(&self, listing_url: &str) -> Vec<String> {
        match self.try_discover_links(listing_url).await {
            Ok(links) => {
                info!(count = links.len(), "Discovered meal links");
                links
            }
            Err(e) => {
                error!(url = %listing_url, step = e.step(), error = %e, "Menu discovery failed");
                Vec::new()
            }
        }
    }

    pub async fn try_discover_links(&self, listing_url: &str) -> Result<Vec<String>, ScrapeError> {
        match self.protocol {
            VendorProtocol::StaticTable | VendorProtocol::InteractiveTabs => {
                wecook::discover_by_date(self.launcher, listing_url).await
            }
            VendorProtocol::PaginatedCards => {
                factor::discover_by_period(self.launcher, listing_url, &self.load_more).await
            }
        }
    }

    /// Nutrition record of one meal page; `None` when it cannot be scraped.
    #[instrument(level = "info", skip(self), fields(protocol = ?self.protocol))]
    pub async fn extract_record(&self, url: &str, period_key: &str) -> Option<NutritionRecord> {
        let result = self
            .retry
            .run(url, || self.try_extract_record(url, period_key))
            .await;
        match result {
            Ok(record) => {
                info!(servings = record.servings.len(), "Scraped nutrition facts");
                Some(record)
            }
            Err(e) => {
                warn!(%url, step = e.step(), error = %e, "Nutrition extraction failed; keeping null");
                None
            }
        }
    }

    pub async fn try_extract_record(
        &self,
        url: &str,
        period_key: &str,
    ) -> Result<NutritionRecord, ScrapeError> {
        match self.protocol {
            VendorProtocol::StaticTable => {
                wecook::scrape_nutrition_table(self.launcher, url, period_key).await
            }
            VendorProtocol::InteractiveTabs => {
                wecook::scrape_serving_tabs(self.launcher, url, period_key, self.settle).await
            }
            VendorProtocol::PaginatedCards => {
                factor::scrape_nutrition_facts(self.launcher, url, period_key).await
            }
        }
    }
}

/// Visible text of an element with runs of whitespace collapsed to one space.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Absolute form of an `href`, relative to the page it was found on.
pub(crate) fn resolve_href(base: Option<&Url>, href: &str) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}

/// Record for a meal page whose identity comes from a `123-meal-name` style slug.
pub(crate) fn record_from_slug(
    url: &str,
    title: Option<String>,
    period_key: &str,
    servings: Servings,
) -> NutritionRecord {
    let (id, slug_name) = id_and_name_from_slug(&url_slug(url));
    NutritionRecord {
        id,
        name: title.filter(|t| !t.is_empty()).unwrap_or(slug_name),
        url: url.to_string(),
        period_key: period_key.to_string(),
        servings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn test_text_of_collapses_whitespace() {
        let doc = Html::parse_fragment("<p>  Serving\n  Size:   <b>Small</b> </p>");
        let p = doc.select(&Selector::parse("p").unwrap()).next().unwrap();
        assert_eq!(text_of(p), "Serving Size: Small");
    }

    #[test]
    fn test_record_title_takes_precedence() {
        let url = "https://www.wecookmeals.ca/en/week-menu/2024-08-05/101-thai-beef-bowl";
        let with_title =
            record_from_slug(url, Some("Thai Beef Bowl".to_string()), "2024-08-05", Servings::new());
        assert_eq!(with_title.id, "101");
        assert_eq!(with_title.name, "Thai Beef Bowl");

        let without = record_from_slug(url, Some(String::new()), "2024-08-05", Servings::new());
        assert_eq!(without.name, "Thai beef bowl");
    }

    #[test]
    fn test_period_keyed_protocols() {
        assert!(VendorProtocol::PaginatedCards.is_period_keyed());
        assert!(!VendorProtocol::InteractiveTabs.is_period_keyed());
        assert!(!VendorProtocol::StaticTable.is_period_keyed());
    }
}
