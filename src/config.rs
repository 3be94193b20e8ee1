//! Vendor registry and scrape tuning.
//!
//! Built-in defaults cover the supported vendors. An optional YAML file can override tuning
//! and add or replace vendors:
//!
//! ```yaml
//! scrape:
//!   concurrency: 4
//!   settle_ms: 1500
//! vendors:
//!   wecook:
//!     name: We-Cook
//!     sitemap_url: https://www.wecookmeals.ca/sitemap.xml
//!     week_menu_url: https://www.wecookmeals.ca/en/week-menu
//!     menu_path_segment: en/week-menu/
//!     protocol: interactive_tabs
//!     link_source: sitemap
//! ```

use crate::browser::chrome::BrowserSettings;
use crate::error::ScrapeError;
use crate::retry::RetryPolicy;
use crate::scrapers::{LoadMoreLimits, VendorProtocol};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument};

/// Where the meal URLs of a week come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    /// The vendor's week listing page, rendered in the browser.
    #[default]
    Listing,
    /// The vendor's sitemap, filtered by menu path and week key.
    Sitemap,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VendorConfig {
    pub name: String,
    pub sitemap_url: String,
    pub week_menu_url: String,
    /// Path fragment that marks week-menu URLs in the sitemap.
    pub menu_path_segment: String,
    pub protocol: VendorProtocol,
    #[serde(default)]
    pub link_source: LinkSource,
    /// Vendor's local time, used to decide what "this week" means.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_utc_offset_hours() -> i32 {
    -5
}

impl VendorConfig {
    pub fn offset(&self) -> Result<FixedOffset, ScrapeError> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            ScrapeError::Config(format!(
                "utc_offset_hours {} out of range for {}",
                self.utc_offset_hours, self.name
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapeSettings {
    /// Meal pages scraped at the same time within one week.
    pub concurrency: usize,
    /// Wait after each click for the page to re-render.
    pub settle_ms: u64,
    /// Quiet period after a page load.
    pub network_idle_ms: u64,
    pub navigation_timeout_secs: u64,
    pub load_more_max_clicks: usize,
    pub load_more_deadline_secs: u64,
    /// Extra attempts per meal page after the first one failed.
    pub retry_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub headless: bool,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            settle_ms: 1000,
            network_idle_ms: 500,
            navigation_timeout_secs: 60,
            load_more_max_clicks: 50,
            load_more_deadline_secs: 120,
            retry_attempts: 0,
            retry_base_delay_ms: 1000,
            headless: true,
        }
    }
}

impl ScrapeSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            headless: self.headless,
            navigation_timeout: Duration::from_secs(self.navigation_timeout_secs),
            network_idle: Duration::from_millis(self.network_idle_ms),
        }
    }

    pub fn load_more_limits(&self) -> LoadMoreLimits {
        LoadMoreLimits {
            max_clicks: self.load_more_max_clicks,
            deadline: Duration::from_secs(self.load_more_deadline_secs),
            settle: self.settle(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub vendors: BTreeMap<String, VendorConfig>,
    pub scrape: ScrapeSettings,
}

/// Shape of the YAML file: every section optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    vendors: BTreeMap<String, VendorConfig>,
    scrape: Option<ScrapeSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut vendors = BTreeMap::new();
        vendors.insert(
            "wecook".to_string(),
            VendorConfig {
                name: "We-Cook".to_string(),
                sitemap_url: "https://www.wecookmeals.ca/sitemap.xml".to_string(),
                week_menu_url: "https://www.wecookmeals.ca/en/week-menu".to_string(),
                menu_path_segment: "en/week-menu/".to_string(),
                protocol: VendorProtocol::InteractiveTabs,
                link_source: LinkSource::Listing,
                utc_offset_hours: -5,
            },
        );
        vendors.insert(
            "wecook-legacy".to_string(),
            VendorConfig {
                name: "We-Cook (nutrition table)".to_string(),
                sitemap_url: "https://www.wecookmeals.ca/sitemap.xml".to_string(),
                week_menu_url: "https://www.wecookmeals.ca/en/week-menu".to_string(),
                menu_path_segment: "en/week-menu/".to_string(),
                protocol: VendorProtocol::StaticTable,
                link_source: LinkSource::Listing,
                utc_offset_hours: -5,
            },
        );
        vendors.insert(
            "factor".to_string(),
            VendorConfig {
                name: "Factor Meals".to_string(),
                sitemap_url: "https://www.factormeals.ca/sitemap.xml".to_string(),
                week_menu_url: "https://www.factormeals.ca/weekly-menu".to_string(),
                menu_path_segment: "weekly-menu/".to_string(),
                protocol: VendorProtocol::PaginatedCards,
                link_source: LinkSource::Listing,
                utc_offset_hours: -5,
            },
        );
        Self {
            vendors,
            scrape: ScrapeSettings::default(),
        }
    }
}

impl AppConfig {
    /// Parse YAML and merge it over the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ScrapeError> {
        let file: ConfigFile =
            serde_yaml::from_str(yaml).map_err(|e| ScrapeError::Config(e.to_string()))?;
        let mut config = Self::default();
        config.vendors.extend(file.vendors);
        if let Some(scrape) = file.scrape {
            config.scrape = scrape;
        }
        Ok(config)
    }

    /// Defaults, or defaults merged with the YAML file at `path`.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self, ScrapeError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ScrapeError::Config(format!("cannot read {path}: {e}")))?;
        let config = Self::from_yaml(&yaml)?;
        info!(vendors = config.vendors.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn vendor(&self, id: &str) -> Result<&VendorConfig, ScrapeError> {
        self.vendors.get(id).ok_or_else(|| {
            let known = self.vendors.keys().cloned().collect::<Vec<_>>().join(", ");
            ScrapeError::InvalidInput(format!("unknown vendor `{id}` (known: {known})"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_vendors() {
        let config = AppConfig::default();
        let wecook = config.vendor("wecook").unwrap();
        assert_eq!(wecook.protocol, VendorProtocol::InteractiveTabs);
        assert_eq!(wecook.menu_path_segment, "en/week-menu/");
        let factor = config.vendor("factor").unwrap();
        assert_eq!(factor.protocol, VendorProtocol::PaginatedCards);
        assert_eq!(factor.week_menu_url, "https://www.factormeals.ca/weekly-menu");
    }

    #[test]
    fn test_unknown_vendor_is_invalid_input() {
        let err = AppConfig::default().vendor("hellofresh").unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidInput(_)));
        assert!(err.to_string().contains("factor"));
    }

    #[test]
    fn test_yaml_overrides_merge_over_defaults() {
        let yaml = r#"
scrape:
  concurrency: 2
  retry_attempts: 1
vendors:
  wecook:
    name: We-Cook
    sitemap_url: https://www.wecookmeals.ca/sitemap.xml
    week_menu_url: https://www.wecookmeals.ca/en/week-menu
    menu_path_segment: en/week-menu/
    protocol: static_table
    link_source: sitemap
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.scrape.concurrency, 2);
        assert_eq!(config.scrape.retry_attempts, 1);
        // untouched fields keep their defaults
        assert_eq!(config.scrape.settle_ms, 1000);

        let wecook = config.vendor("wecook").unwrap();
        assert_eq!(wecook.protocol, VendorProtocol::StaticTable);
        assert_eq!(wecook.link_source, LinkSource::Sitemap);
        assert_eq!(wecook.utc_offset_hours, -5);
        assert!(config.vendor("factor").is_ok());
    }

    #[test]
    fn test_bad_yaml_is_config_error() {
        let err = AppConfig::from_yaml("vendors: [1, 2").unwrap_err();
        assert!(matches!(err, ScrapeError::Config(_)));
    }

    #[test]
    fn test_vendor_offset() {
        let config = AppConfig::default();
        let offset = config.vendor("wecook").unwrap().offset().unwrap();
        assert_eq!(offset.local_minus_utc(), -5 * 3600);
    }
}
