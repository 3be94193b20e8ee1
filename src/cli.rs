//! Command-line interface definitions.
//!
//! Every option can also come from the environment where noted, so scheduled runs only need
//! `MEAL_VENDOR` and `MEAL_OUTPUT_DIR`.

use clap::Parser;

/// Scrape weekly meal-kit menus into per-week nutrition JSON files.
///
/// # Examples
///
/// ```sh
/// # This week's We-Cook menu
/// meal_nutrition_scraper --vendor wecook
///
/// # Two specific weeks
/// meal_nutrition_scraper --vendor wecook 2024-08-05 2024-08-12
///
/// # Every Factor week of August 2024, 4 meal pages at a time
/// meal_nutrition_scraper --vendor factor --month 2024-08 --concurrency 4 -o ./data
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Vendor id from the configuration (wecook, wecook-legacy, factor)
    #[arg(long, env = "MEAL_VENDOR")]
    pub vendor: String,

    /// Week keys: Mondays as YYYY-MM-DD, or YYYY-Www for week-numbered vendors
    #[arg(value_name = "DATES")]
    pub dates: Vec<String>,

    /// Scrape every week of a month, given as YYYY-MM
    #[arg(long, value_name = "YYYY-MM")]
    pub month: Option<String>,

    /// Root directory for the JSON files
    #[arg(short, long, env = "MEAL_OUTPUT_DIR", default_value = "./data")]
    pub output_dir: String,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Meal pages scraped at the same time (overrides the config)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Extra attempts per meal page (overrides the config)
    #[arg(long)]
    pub retries: Option<usize>,

    /// Write straight into the output dir instead of a per-vendor subdirectory
    #[arg(long)]
    pub no_vendor_dir: bool,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "meal_nutrition_scraper",
            "--vendor",
            "wecook",
            "2024-08-05",
            "2024-08-12",
        ]);

        assert_eq!(cli.vendor, "wecook");
        assert_eq!(cli.dates, vec!["2024-08-05", "2024-08-12"]);
        assert_eq!(cli.output_dir, "./data");
        assert!(cli.month.is_none());
        assert!(cli.concurrency.is_none());
        assert!(!cli.no_vendor_dir);
        assert!(!cli.headful);
    }

    #[test]
    fn test_cli_month_and_overrides() {
        let cli = Cli::parse_from([
            "meal_nutrition_scraper",
            "--vendor",
            "factor",
            "--month",
            "2024-08",
            "-o",
            "/tmp/meals",
            "-c",
            "meals.yaml",
            "--concurrency",
            "4",
            "--retries",
            "2",
            "--no-vendor-dir",
            "--headful",
        ]);

        assert_eq!(cli.month.as_deref(), Some("2024-08"));
        assert_eq!(cli.output_dir, "/tmp/meals");
        assert_eq!(cli.config.as_deref(), Some("meals.yaml"));
        assert_eq!(cli.concurrency, Some(4));
        assert_eq!(cli.retries, Some(2));
        assert!(cli.dates.is_empty());
        assert!(cli.no_vendor_dir);
        assert!(cli.headful);
    }
}
