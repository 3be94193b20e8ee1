//! We-Cook weekly menus.
//!
//! Menus are published per Monday at `https://www.wecookmeals.ca/en/week-menu/{YYYY-MM-DD}`.
//! Meal pages come in two layouts:
//!
//! - **Nutrition table** (older pages): one column per serving size.
//!
//! ```text
//! | Nutrition Facts   | Serving Size: Small | Serving Size: Regular |
//! |-------------------|---------------------|-----------------------|
//! | Calories / kcal:  | 450                 | 650                   |
//! | Fat / g:          | 20                  | 30                    |
//! ```
//!
//! - **Serving tabs** (current pages): a swiper of serving buttons; the facts panel only shows
//!   the serving whose button was clicked last, so every button is clicked in turn.

use super::normalize::{compact_value, nutrient_label};
use super::{record_from_slug, resolve_href, text_of};
use crate::browser::{BrowserLauncher, BrowserSession, close_quietly};
use crate::error::ScrapeError;
use crate::models::{NutrientMap, NutritionRecord, Servings};
use crate::utils::truncate_for_log;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use url::Url;

pub const LISTING_CARD: &str = "a.h-full";
pub const NUTRITION_TABLE: &str = "#nutrition-facts";
pub const SERVING_TOGGLE: &str = "div.page-menu-swiper div.swiper-wrapper div.swiper-slide button";

static LISTING_CARD_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(LISTING_CARD).unwrap());
static TABLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(NUTRITION_TABLE).unwrap());
static HEADER_CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("thead th").unwrap());
static BODY_ROW_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody tr").unwrap());
static CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());
static TOGGLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(SERVING_TOGGLE).unwrap());
static TITLE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.bg-beige h2.text-heading-sm").unwrap());
static FACT_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.facts-container div.facts-container span").unwrap());
static BOLD_FACT_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.facts-container div.facts-container span.font-bold").unwrap()
});

/// Meal links of a date-keyed listing page, in page order.
#[instrument(level = "info", skip(launcher))]
pub async fn discover_by_date<L: BrowserLauncher>(
    launcher: &L,
    listing_url: &str,
) -> Result<Vec<String>, ScrapeError> {
    let mut session = launcher.open().await?;
    let result = read_listing(&mut session, listing_url).await;
    close_quietly(session, listing_url).await;
    result
}

async fn read_listing<S: BrowserSession>(
    session: &mut S,
    listing_url: &str,
) -> Result<Vec<String>, ScrapeError> {
    session.navigate(listing_url).await?;
    let base = session
        .current_url()
        .await
        .unwrap_or_else(|_| listing_url.to_string());
    let html = session.content().await?;
    Ok(parse_listing_links(&html, &base))
}

/// Resolved `href`s of every menu card. Duplicates are kept.
pub fn parse_listing_links(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    document
        .select(&LISTING_CARD_SEL)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter_map(|href| resolve_href(base.as_ref(), href))
        .collect()
}

/// Scrape a meal page laid out with the multi-column nutrition table.
#[instrument(level = "info", skip(launcher))]
pub async fn scrape_nutrition_table<L: BrowserLauncher>(
    launcher: &L,
    url: &str,
    period_key: &str,
) -> Result<NutritionRecord, ScrapeError> {
    let mut session = launcher.open().await?;
    let result = read_nutrition_table(&mut session, url, period_key).await;
    close_quietly(session, url).await;
    result
}

async fn read_nutrition_table<S: BrowserSession>(
    session: &mut S,
    url: &str,
    period_key: &str,
) -> Result<NutritionRecord, ScrapeError> {
    session.navigate(url).await?;
    let html = session.content().await?;
    let Some(servings) = parse_nutrition_table(&html) else {
        debug!(page_preview = %truncate_for_log(&html, 300), "Page has no nutrition table");
        return Err(ScrapeError::missing(url, NUTRITION_TABLE));
    };
    Ok(record_from_slug(url, None, period_key, servings))
}

/// Servings from the nutrition table, or `None` when the page has no table.
///
/// Every header column gets an entry, even if none of its cells could be read. A missing or
/// empty cell only drops that nutrient from that one serving.
pub fn parse_nutrition_table(html: &str) -> Option<Servings> {
    let document = Html::parse_document(html);
    let table = document.select(&TABLE_SEL).next()?;

    let labels: Vec<String> = table
        .select(&HEADER_CELL_SEL)
        .skip(1)
        .map(|th| text_of(th).to_lowercase())
        .collect();

    let mut servings: Servings = labels
        .iter()
        .map(|label| (label.clone(), NutrientMap::new()))
        .collect();

    for row in table.select(&BODY_ROW_SEL) {
        let cells: Vec<ElementRef> = row.select(&CELL_SEL).collect();
        let Some(first) = cells.first() else {
            continue;
        };
        let label = nutrient_label(&text_of(*first));
        if label.key.is_empty() {
            continue;
        }

        for (index, serving) in labels.iter().enumerate() {
            let Some(cell) = cells.get(index + 1) else {
                debug!(nutrient = %label.key, %serving, "Missing nutrition cell");
                continue;
            };
            let value = text_of(*cell);
            if value.is_empty() {
                continue;
            }
            if let Some(nutrients) = servings.get_mut(serving) {
                nutrients.insert(label.key.clone(), format!("{value}{}", label.unit));
            }
        }
    }

    Some(servings)
}

/// Scrape a meal page whose facts panel switches with serving toggles.
#[instrument(level = "info", skip(launcher, settle))]
pub async fn scrape_serving_tabs<L: BrowserLauncher>(
    launcher: &L,
    url: &str,
    period_key: &str,
    settle: Duration,
) -> Result<NutritionRecord, ScrapeError> {
    let mut session = launcher.open().await?;
    let result = read_serving_tabs(&mut session, url, period_key, settle).await;
    close_quietly(session, url).await;
    result
}

async fn read_serving_tabs<S: BrowserSession>(
    session: &mut S,
    url: &str,
    period_key: &str,
    settle: Duration,
) -> Result<NutritionRecord, ScrapeError> {
    session.navigate(url).await?;
    let html = session.content().await?;
    let (title, toggles) = parse_toggle_page(&html);
    if toggles.is_empty() {
        return Err(ScrapeError::missing(url, SERVING_TOGGLE));
    }

    let mut servings = Servings::new();
    for (index, serving) in toggles.iter().enumerate() {
        if !session.click(SERVING_TOGGLE, index).await? {
            warn!(%url, %serving, index, "Serving toggle disappeared before it was clicked");
            servings.entry(serving.clone()).or_default();
            continue;
        }
        sleep(settle).await;

        let panel = session.content().await?;
        let nutrients = parse_serving_panel(&panel);
        debug!(%serving, nutrients = nutrients.len(), "Read serving panel");
        servings.insert(serving.clone(), nutrients);
    }

    Ok(record_from_slug(url, title, period_key, servings))
}

/// Meal title (if rendered) and the label of every serving toggle, in document order.
pub fn parse_toggle_page(html: &str) -> (Option<String>, Vec<String>) {
    let document = Html::parse_document(html);
    let title = document
        .select(&TITLE_SEL)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty());
    let toggles = document
        .select(&TOGGLE_SEL)
        .map(|button| text_of(button).to_lowercase())
        .collect();
    (title, toggles)
}

/// Nutrients shown in the facts panel for the active serving.
///
/// Values are the text node right after each label span, with all whitespace removed.
pub fn parse_serving_panel(html: &str) -> NutrientMap {
    let document = Html::parse_document(html);
    let mut nutrients = NutrientMap::new();

    let calories = document
        .select(&FACT_SEL)
        .find(|span| span.text().any(|t| t.contains("Calories")))
        .and_then(next_text);
    if let Some(value) = calories.map(|v| compact_value(&v)).filter(|v| !v.is_empty()) {
        nutrients.insert("calories".to_string(), value);
    }

    for label in document.select(&BOLD_FACT_SEL) {
        let key = nutrient_label(&text_of(label)).key;
        let value = next_text(label).map(|v| compact_value(&v)).unwrap_or_default();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        nutrients.insert(key, value);
    }

    nutrients
}

/// Text that immediately follows an element: a bare text node, or the next element's text.
fn next_text(element: ElementRef<'_>) -> Option<String> {
    let sibling = element.next_sibling()?;
    if let Some(text) = sibling.value().as_text() {
        let text: &str = text;
        return Some(text.trim().to_string());
    }
    ElementRef::wrap(sibling).map(text_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakePage, FakeSite};
    use crate::retry::RetryPolicy;
    use crate::scrapers::{LoadMoreLimits, VendorProtocol, VendorScraper};

    const MEAL_URL: &str = "https://www.wecookmeals.ca/en/week-menu/2024-08-05/101-thai-beef-bowl";

    const TABLE_PAGE: &str = r#"<html><body>
        <table id="nutrition-facts">
          <thead><tr><th>Nutrition Facts</th><th>Small</th><th>Regular</th></tr></thead>
          <tbody>
            <tr><td>Calories / kcal:</td><td>450</td><td>650</td></tr>
            <tr><td>Total Fat / g:</td><td>20</td><td>30</td></tr>
            <tr><td>Sodium / mg:</td><td>800</td></tr>
            <tr><td>Protein / g</td><td> </td><td>42</td></tr>
          </tbody>
        </table>
    </body></html>"#;

    fn toggle_page(active: &str, calories: &str, fat: &str) -> String {
        format!(
            r#"<html><body>
            <div class="bg-beige"><h2 class="text-heading-sm"> Thai Beef Bowl </h2></div>
            <div class="page-menu-swiper"><div class="swiper-wrapper">
              <div class="swiper-slide"><button>Small</button></div>
              <div class="swiper-slide"><button>Regular</button></div>
            </div></div>
            <p class="active">{active}</p>
            <div class="facts-container"><div class="facts-container">
              <span>Calories</span> {calories}
              <span class="font-bold">Fat</span> {fat}
              <span class="font-bold">Saturated Fat</span> 4 g
              <span class="font-bold">Fibre</span>
            </div></div>
            </body></html>"#
        )
    }

    fn limits() -> LoadMoreLimits {
        LoadMoreLimits {
            max_clicks: 5,
            deadline: Duration::from_secs(5),
            settle: Duration::ZERO,
        }
    }

    #[test]
    fn test_parse_nutrition_table() {
        let servings = parse_nutrition_table(TABLE_PAGE).unwrap();
        assert_eq!(servings.len(), 2);

        let small = &servings["small"];
        assert_eq!(small["calories"], "450kcal");
        assert_eq!(small["total_fat"], "20g");
        assert_eq!(small["sodium"], "800mg");
        assert!(!small.contains_key("protein"));

        let regular = &servings["regular"];
        assert_eq!(regular["calories"], "650kcal");
        assert_eq!(regular["protein"], "42g");
        // row without a regular cell: absent only from that serving
        assert!(!regular.contains_key("sodium"));
    }

    #[test]
    fn test_parse_nutrition_table_keeps_empty_servings() {
        let html = r#"<table id="nutrition-facts">
            <thead><tr><th></th><th>Small</th><th>Large</th></tr></thead>
            <tbody><tr><td>Calories</td><td>300</td></tr></tbody></table>"#;
        let servings = parse_nutrition_table(html).unwrap();
        assert_eq!(servings["small"]["calories"], "300");
        assert!(servings["large"].is_empty());
    }

    #[test]
    fn test_parse_nutrition_table_missing() {
        assert!(parse_nutrition_table("<html><body><p>Sold out</p></body></html>").is_none());
    }

    #[test]
    fn test_parse_listing_links_resolves_relative() {
        let html = r#"<a class="h-full" href="/en/week-menu/2024-08-05/101-thai-beef-bowl">A</a>
            <a class="h-full" href="https://www.wecookmeals.ca/en/week-menu/2024-08-05/102-pasta">B</a>
            <a class="other" href="/en/about">C</a>"#;
        let links = parse_listing_links(html, "https://www.wecookmeals.ca/en/week-menu/2024-08-05");
        assert_eq!(
            links,
            vec![
                "https://www.wecookmeals.ca/en/week-menu/2024-08-05/101-thai-beef-bowl",
                "https://www.wecookmeals.ca/en/week-menu/2024-08-05/102-pasta",
            ]
        );
    }

    #[test]
    fn test_parse_serving_panel() {
        let nutrients = parse_serving_panel(&toggle_page("small", "450", "20 g"));
        assert_eq!(nutrients["calories"], "450");
        assert_eq!(nutrients["fat"], "20g");
        assert_eq!(nutrients["saturated_fat"], "4g");
        assert!(!nutrients.contains_key("fibre"));
    }

    #[test]
    fn test_parse_toggle_page() {
        let (title, toggles) = parse_toggle_page(&toggle_page("none", "0", "0"));
        assert_eq!(title.as_deref(), Some("Thai Beef Bowl"));
        assert_eq!(toggles, vec!["small", "regular"]);
    }

    #[tokio::test]
    async fn test_scrape_serving_tabs_clicks_every_toggle() {
        let launcher = FakeSite::new()
            .page(
                MEAL_URL,
                FakePage::new(toggle_page("none", "", ""))
                    .state(toggle_page("small", "450", "20 g"))
                    .state(toggle_page("regular", "650", "30 g"))
                    .on_click(None, SERVING_TOGGLE, 0, 1)
                    .on_click(None, SERVING_TOGGLE, 1, 2),
            )
            .launcher();

        let record = scrape_serving_tabs(&launcher, MEAL_URL, "2024-08-05", Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(record.id, "101");
        assert_eq!(record.name, "Thai Beef Bowl");
        assert_eq!(record.period_key, "2024-08-05");
        assert_eq!(record.servings["small"]["calories"], "450");
        assert_eq!(record.servings["regular"]["calories"], "650");
        assert_eq!(record.servings["regular"]["fat"], "30g");
        assert_eq!(launcher.opened(), 1);
        assert_eq!(launcher.closed(), 1);
    }

    #[tokio::test]
    async fn test_scrape_serving_tabs_without_toggles_fails() {
        let launcher = FakeSite::new()
            .page(MEAL_URL, FakePage::new("<html><body></body></html>"))
            .launcher();

        let err = scrape_serving_tabs(&launcher, MEAL_URL, "2024-08-05", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::MissingElement { .. }));
        assert_eq!(launcher.closed(), 1);
    }

    #[tokio::test]
    async fn test_scrape_nutrition_table_record() {
        let launcher = FakeSite::new()
            .page(MEAL_URL, FakePage::new(TABLE_PAGE))
            .launcher();

        let record = scrape_nutrition_table(&launcher, MEAL_URL, "2024-08-05")
            .await
            .unwrap();
        assert_eq!(record.name, "Thai beef bowl");
        assert_eq!(record.servings["small"]["total_fat"], "20g");
        assert_eq!(launcher.closed(), 1);
    }

    #[tokio::test]
    async fn test_extract_record_is_null_on_navigation_error() {
        let launcher = FakeSite::new().broken(MEAL_URL).launcher();
        let scraper = VendorScraper::new(
            &launcher,
            VendorProtocol::StaticTable,
            Duration::ZERO,
            limits(),
            RetryPolicy::default(),
        );

        assert!(scraper.extract_record(MEAL_URL, "2024-08-05").await.is_none());
        assert_eq!(launcher.opened(), 1);
        assert_eq!(launcher.closed(), 1);
    }

    #[tokio::test]
    async fn test_discover_by_date_returns_empty_on_404() {
        let launcher = FakeSite::new().launcher();
        let scraper = VendorScraper::new(
            &launcher,
            VendorProtocol::InteractiveTabs,
            Duration::ZERO,
            limits(),
            RetryPolicy::default(),
        );

        let links = scraper
            .discover_links("https://www.wecookmeals.ca/en/week-menu/2024-08-05")
            .await;
        assert!(links.is_empty());
        assert_eq!(launcher.closed(), 1);
    }
}
