//! Calendar anchors for weekly menus.
//!
//! Date-keyed vendors publish one menu per Monday (`YYYY-MM-DD`), period-keyed vendors one menu
//! per week number (`YYYY-Www`). Everything in here is pure and works on [`NaiveDate`] so no
//! host timezone leaks into the results; only [`today_in`] looks at the clock.

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static MONTH_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static PERIOD_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-W(\d{2})$").unwrap());

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a strict `YYYY-MM-DD` string. Anything else is `None`.
pub fn parse_date(date_str: &str) -> Option<NaiveDate> {
    if !DATE_SHAPE.is_match(date_str) {
        return None;
    }
    NaiveDate::parse_from_str(date_str, DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn is_valid_date(date_str: &str) -> bool {
    parse_date(date_str).is_some()
}

/// All Mondays of a month, `month0` being 0-based (January is 0).
pub fn mondays_of_month(year: i32, month0: u32) -> Vec<String> {
    weekdays_of_month(year, month0, Weekday::Mon)
}

/// All Sundays of a month, `month0` being 0-based.
///
/// Calendar dates carry no offset, so the vendor's local day is the day returned here.
pub fn sundays_of_month(year: i32, month0: u32) -> Vec<String> {
    weekdays_of_month(year, month0, Weekday::Sun)
}

fn weekdays_of_month(year: i32, month0: u32, weekday: Weekday) -> Vec<String> {
    let Some(mut date) = NaiveDate::from_ymd_opt(year, month0 + 1, 1) else {
        return Vec::new();
    };
    while date.weekday() != weekday {
        date += Duration::days(1);
    }

    let mut dates = Vec::new();
    while date.month0() == month0 {
        dates.push(format_date(date));
        date += Duration::days(7);
    }
    dates
}

/// `true` only for a well-formed `YYYY-MM-DD` that falls on a Monday.
pub fn is_valid_monday(date_str: &str) -> bool {
    parse_date(date_str).is_some_and(|d| d.weekday() == Weekday::Mon)
}

/// Round a date back to the most recent Sunday (the date itself when it is one).
pub fn closest_sunday(date_str: &str) -> Option<String> {
    let date = parse_date(date_str)?;
    let back = date.weekday().num_days_from_sunday() as i64;
    Some(format_date(date - Duration::days(back)))
}

/// Monday of the week containing `date`.
pub fn monday_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Week key `YYYY-Www` for a calendar date.
///
/// Weeks run Sunday through Saturday and are numbered by their Saturday: the day of year shifted
/// by January 1st's weekday, in the Saturday's year. Every day of a week yields the same key, and
/// the week holding January 1st is always week 1 of the new year.
pub fn iso_week_key(date: NaiveDate) -> String {
    let forward = 6 - date.weekday().num_days_from_sunday() as i64;
    let saturday = date.checked_add_signed(Duration::days(forward)).unwrap_or(date);
    let jan1 = NaiveDate::from_ymd_opt(saturday.year(), 1, 1).unwrap_or(saturday);
    let offset = jan1.weekday().num_days_from_sunday();
    let week = (saturday.ordinal0() + offset) / 7 + 1;
    format!("{}-W{:02}", saturday.year(), week)
}

/// Week keys of every week that overlaps a month, `month0` being 0-based.
///
/// That is the week holding the 1st (when the month does not start on a Sunday) followed by the
/// week of each Sunday of the month.
pub fn period_keys_of_month(year: i32, month0: u32) -> Vec<String> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month0 + 1, 1) else {
        return Vec::new();
    };
    let mut keys = Vec::new();
    if first.weekday() != Weekday::Sun {
        keys.push(iso_week_key(first));
    }
    keys.extend(
        sundays_of_month(year, month0)
            .iter()
            .filter_map(|sunday| parse_date(sunday))
            .map(iso_week_key),
    );
    keys
}

pub fn is_valid_period_key(key: &str) -> bool {
    PERIOD_SHAPE
        .captures(key)
        .and_then(|caps| caps[2].parse::<u32>().ok())
        .is_some_and(|week| (1..=54).contains(&week))
}

/// `YYYY-MM` to `(year, month0)`.
pub fn parse_month(month: &str) -> Option<(i32, u32)> {
    let caps = MONTH_SHAPE.captures(month)?;
    let year = caps[1].parse::<i32>().ok()?;
    let month1 = caps[2].parse::<u32>().ok()?;
    (1..=12).contains(&month1).then(|| (year, month1 - 1))
}

/// Today's date as seen from a vendor's fixed UTC offset.
pub fn today_in(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

/// Output directory bucket for a key: `YYYY-MM` for dates, the key itself for periods.
pub fn bucket_for_key(key: &str) -> String {
    match parse_date(key) {
        Some(date) => date.format("%Y-%m").to_string(),
        None => key.to_string(),
    }
}
