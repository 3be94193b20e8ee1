//! Factor Meals weekly menus.
//!
//! The weekly menu lives at `https://www.factormeals.ca/weekly-menu/{YYYY-Www}` and only shows a
//! first batch of recipe cards; a "load more" button appends the rest until it disappears. Each
//! card renders several anchors to the same recipe, so links are deduplicated.
//!
//! Recipe pages carry one nutrition list for a single serving, stored under `regular`.

use super::normalize::{clean_value, label_key};
use super::{LoadMoreLimits, resolve_href, text_of};
use crate::browser::{BrowserLauncher, BrowserSession, close_quietly};
use crate::error::ScrapeError;
use crate::models::{NutrientMap, NutritionRecord, Servings};
use crate::utils::{query_param, truncate_for_log, upcase, url_slug};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, instrument};
use url::Url;

pub const LOAD_MORE: &str = "div.web-riauoa button.sc-e95c4911-0.hFDzbe";
pub const RECIPE_CARD_LINK: &str = "div[data-recipe-card] a";
pub const NUTRITION_CONTAINER: &str = r#"div[data-test-id="recipe-nutrition"]"#;
pub const SERVING: &str = "regular";

static LOAD_MORE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(LOAD_MORE).unwrap());
static RECIPE_CARD_LINK_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(RECIPE_CARD_LINK).unwrap());
static TITLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("h1[data-recipe-title]").unwrap());
static NUTRITION_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(NUTRITION_CONTAINER).unwrap());
static PAIR_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(".web-dxsv06").unwrap());
static PAIR_LABEL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("small").unwrap());
static PAIR_VALUE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("span").unwrap());

/// Unique recipe links of a period-keyed listing, after every card was loaded.
#[instrument(level = "info", skip(launcher, limits))]
pub async fn discover_by_period<L: BrowserLauncher>(
    launcher: &L,
    listing_url: &str,
    limits: &LoadMoreLimits,
) -> Result<Vec<String>, ScrapeError> {
    let mut session = launcher.open().await?;
    let result = read_paginated_listing(&mut session, listing_url, limits).await;
    close_quietly(session, listing_url).await;
    result
}

async fn read_paginated_listing<S: BrowserSession>(
    session: &mut S,
    listing_url: &str,
    limits: &LoadMoreLimits,
) -> Result<Vec<String>, ScrapeError> {
    session.navigate(listing_url).await?;
    let html = load_all_cards(session, listing_url, limits).await?;
    let base = session
        .current_url()
        .await
        .unwrap_or_else(|_| listing_url.to_string());
    Ok(parse_recipe_links(&html, &base))
}

/// Click "load more" until it is gone and return the final DOM.
///
/// Fails with a navigation error once `max_clicks` or the deadline is reached while the
/// control is still rendered.
async fn load_all_cards<S: BrowserSession>(
    session: &mut S,
    listing_url: &str,
    limits: &LoadMoreLimits,
) -> Result<String, ScrapeError> {
    let started = Instant::now();
    let mut clicks = 0usize;

    loop {
        let html = session.content().await?;
        if !has_load_more(&html) {
            info!(clicks, "All recipe cards loaded");
            return Ok(html);
        }
        if clicks >= limits.max_clicks {
            return Err(ScrapeError::navigation(
                listing_url,
                format!("load-more control still present after {clicks} clicks"),
            ));
        }
        if started.elapsed() >= limits.deadline {
            return Err(ScrapeError::navigation(
                listing_url,
                format!("load-more deadline of {:?} exceeded", limits.deadline),
            ));
        }

        if !session.click(LOAD_MORE, 0).await? {
            return Ok(html);
        }
        clicks += 1;
        debug!(clicks, "Clicked load more");
        sleep(limits.settle).await;
    }
}

pub fn has_load_more(html: &str) -> bool {
    Html::parse_document(html)
        .select(&LOAD_MORE_SEL)
        .next()
        .is_some()
}

/// Resolved recipe links, first occurrence order, without duplicates.
pub fn parse_recipe_links(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    document
        .select(&RECIPE_CARD_LINK_SEL)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter_map(|href| resolve_href(base.as_ref(), href))
        .unique()
        .collect()
}

/// Scrape a recipe page's nutrition list.
#[instrument(level = "info", skip(launcher))]
pub async fn scrape_nutrition_facts<L: BrowserLauncher>(
    launcher: &L,
    url: &str,
    period_key: &str,
) -> Result<NutritionRecord, ScrapeError> {
    let mut session = launcher.open().await?;
    let result = read_nutrition_facts(&mut session, url, period_key).await;
    close_quietly(session, url).await;
    result
}

async fn read_nutrition_facts<S: BrowserSession>(
    session: &mut S,
    url: &str,
    period_key: &str,
) -> Result<NutritionRecord, ScrapeError> {
    session.navigate(url).await?;
    let html = session.content().await?;
    let Some((title, nutrients)) = parse_nutrition_facts(&html) else {
        debug!(page_preview = %truncate_for_log(&html, 300), "Page has no nutrition container");
        return Err(ScrapeError::missing(url, NUTRITION_CONTAINER));
    };

    let (id, slug_name) = recipe_identity(url);
    let mut servings = Servings::new();
    servings.insert(SERVING.to_string(), nutrients);

    Ok(NutritionRecord {
        id,
        name: title.unwrap_or(slug_name),
        url: url.to_string(),
        period_key: query_param(url, "week").unwrap_or_else(|| period_key.to_string()),
        servings,
    })
}

/// Recipe title (if rendered) and its nutrients, or `None` without a nutrition container.
pub fn parse_nutrition_facts(html: &str) -> Option<(Option<String>, NutrientMap)> {
    let document = Html::parse_document(html);
    let container = document.select(&NUTRITION_SEL).next()?;
    let title = document
        .select(&TITLE_SEL)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty());

    let mut nutrients = NutrientMap::new();
    for pair in container.select(&PAIR_SEL) {
        let label = pair.select(&PAIR_LABEL_SEL).next();
        let value = pair.select(&PAIR_VALUE_SEL).next();
        if let (Some(label), Some(value)) = (label, value) {
            let key = label_key(&text_of(label));
            if !key.is_empty() {
                nutrients.insert(key, clean_value(&text_of(value)));
            }
        }
    }

    Some((title, nutrients))
}

/// `garlic-chicken-64f1c` → id `64f1c`, name `Garlic chicken`.
pub fn recipe_identity(url: &str) -> (String, String) {
    let slug = url_slug(url);
    let mut words: Vec<&str> = slug.split('-').filter(|w| !w.is_empty()).collect();
    let id = words.pop().unwrap_or_default().to_string();
    (id, upcase(&words.join(" ")))
}
