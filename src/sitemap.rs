//! Sitemap-based discovery of week-menu URLs.
//!
//! Vendor sitemaps are flat `<urlset>` documents, so URLs are pulled out of `<loc>` tags with a
//! pattern match instead of a full XML parse.

use crate::error::ScrapeError;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};
use url::Url;

static LOC_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<loc>(.*?)</loc>").unwrap());

/// Something that can GET a document as text.
pub trait SitemapFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError>;
}

impl SitemapFetcher for reqwest::Client {
    async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
        let fetch_error = |reason: String| ScrapeError::Fetch {
            url: url.to_string(),
            reason,
        };
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {status}")));
        }
        response.text().await.map_err(|e| fetch_error(e.to_string()))
    }
}

/// Fetch the sitemap and return every `<loc>` URL in document order.
#[instrument(level = "info", skip(fetcher))]
pub async fn fetch_sitemap_urls<F: SitemapFetcher>(
    fetcher: &F,
    sitemap_url: &str,
) -> Result<Vec<String>, ScrapeError> {
    let body = fetcher.fetch_text(sitemap_url).await?;
    let urls = extract_loc_urls(&body);
    info!(count = urls.len(), "Extracted sitemap URLs");
    Ok(urls)
}

pub fn extract_loc_urls(xml: &str) -> Vec<String> {
    LOC_TAG
        .captures_iter(xml)
        .map(|caps| caps[1].trim().replace("&amp;", "&"))
        .filter(|url| !url.is_empty())
        .collect()
}

/// Keep the URLs whose path contains the vendor's week-menu segment, in input order.
pub fn filter_menu_urls(urls: &[String], menu_path_segment: &str) -> Vec<String> {
    urls.iter()
        .filter(|url| url.contains(menu_path_segment))
        .cloned()
        .collect()
}

/// Menu URLs that belong to one week: the key is a path segment or a query value.
pub fn menu_urls_for_key(urls: &[String], menu_path_segment: &str, key: &str) -> Vec<String> {
    let matching: Vec<String> = filter_menu_urls(urls, menu_path_segment)
        .into_iter()
        .filter(|url| url_mentions_key(url, key))
        .unique()
        .collect();
    debug!(%key, count = matching.len(), "Sitemap URLs for week");
    matching
}

fn url_mentions_key(url: &str, key: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            let in_path = parsed
                .path_segments()
                .is_some_and(|mut segments| segments.any(|s| s == key));
            in_path || parsed.query_pairs().any(|(_, value)| value == key)
        }
        Err(_) => url.split(['/', '?', '=', '&']).any(|part| part == key),
    }
}

/// Listing page of one week: `{week_menu_url}/{key}`.
pub fn build_url_by_key(week_menu_url: &str, key: &str) -> String {
    format!("{}/{}", week_menu_url.trim_end_matches('/'), key)
}
