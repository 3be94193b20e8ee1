//! URL slug helpers, string helpers and file system checks.
//!
//! - Meal identity (`id`, fallback `name`) derived from a meal page URL
//! - Capitalization and log truncation
//! - Output directory validation

use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};
use url::Url;

const SCRATCH_FILE: &str = ".meal_scraper_write_check";

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (on a char boundary) with an ellipsis and the number of
/// dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Capitalize the first character of a string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(upcase("thai beef bowl"), "Thai beef bowl");
/// assert_eq!(upcase(""), "");
/// ```
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Last non-empty path segment of a URL, percent-decoded, without query or fragment.
///
/// Falls back to plain string splitting when the input is not an absolute URL.
pub fn url_slug(url: &str) -> String {
    let raw = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
            .unwrap_or_default(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string(),
    };
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw)
}

/// Split a meal slug like `123-thai-beef-bowl` into `("123", "Thai beef bowl")`.
///
/// Without a numeric prefix the whole slug is the id and every word goes into the name.
pub fn id_and_name_from_slug(slug: &str) -> (String, String) {
    let mut parts = slug.split('-').filter(|p| !p.is_empty()).peekable();
    let numeric_prefix = parts
        .peek()
        .is_some_and(|first| first.chars().all(|c| c.is_ascii_digit()));

    if numeric_prefix {
        let id = parts.next().unwrap_or_default().to_string();
        let name = parts.collect::<Vec<_>>().join(" ");
        (id, upcase(&name))
    } else {
        let name = parts.collect::<Vec<_>>().join(" ");
        (slug.to_string(), upcase(&name))
    }
}

/// Value of a query parameter, if the URL parses and carries it.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|parsed| {
        parsed
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    })
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and immediately removes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    let scratch_path = Path::new(path).join(SCRATCH_FILE);
    if let Err(e) = fs::write(&scratch_path, b"").await {
        return Err(Box::new(e));
    }
    if let Err(e) = fs::remove_file(&scratch_path).await {
        warn!(file = %scratch_path.display(), error = %e, "Could not remove scratch file; delete it by hand");
    }
    info!("Output directory is writable");
    Ok(())
}
