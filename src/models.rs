//! Data models for scraped menus and their persisted representation.
//!
//! - [`NutritionRecord`]: nutrition facts of one meal, keyed by serving label
//! - [`WeekBatch`]: every meal of one week, as written to disk
//!
//! Field names are camelCase on the wire to stay compatible with the JSON files consumers
//! already read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Nutrient key (e.g. `total_fat`) to a vendor-formatted value (e.g. `12g`).
///
/// Values stay text: vendors print things like `<1g` or `N/A` that are not numbers.
pub type NutrientMap = BTreeMap<String, String>;

/// Serving label (e.g. `small`, `regular`) to the nutrients measured for that serving.
pub type Servings = BTreeMap<String, NutrientMap>;

/// Nutrition facts of a single meal page.
///
/// Built in one extraction call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionRecord {
    /// Leading numeric token of the URL slug, or the whole slug when there is none.
    pub id: String,
    /// Page title when rendered, otherwise derived from the URL slug.
    pub name: String,
    /// The meal page the record was scraped from.
    pub url: String,
    /// Date (`YYYY-MM-DD`) or week (`YYYY-Www`) this meal was listed under.
    pub period_key: String,
    pub servings: Servings,
}

/// All meals of one week, in discovery order.
///
/// Meals that could not be scraped stay in place as `None` (`null` in JSON), so
/// `number_of_week_menus` always equals `week_menus.len()`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekBatch {
    pub date: String,
    pub number_of_week_menus: usize,
    pub week_menus: Vec<Option<NutritionRecord>>,
}

impl WeekBatch {
    pub fn new(date: impl Into<String>, week_menus: Vec<Option<NutritionRecord>>) -> Self {
        Self {
            date: date.into(),
            number_of_week_menus: week_menus.len(),
            week_menus,
        }
    }

    pub fn scraped_count(&self) -> usize {
        self.week_menus.iter().filter(|m| m.is_some()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.number_of_week_menus - self.scraped_count()
    }
}
