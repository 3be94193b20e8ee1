//! Error taxonomy for the scraping pipeline.
//!
//! Failures fall into two groups:
//!
//! - **Contained**: [`ScrapeError::Navigation`] and [`ScrapeError::MissingElement`] are raised
//!   inside one meal or one listing page. The discovery and extraction boundaries log them and
//!   degrade to an empty link set or a `null` record.
//! - **Fatal**: [`ScrapeError::InvalidInput`] (bad vendor, no usable dates) and
//!   [`ScrapeError::Config`] stop the run before any page is opened.
//!
//! [`ScrapeError::Fetch`] is propagated to whoever asked for the sitemap; whether it is fatal is
//! the caller's decision.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The sitemap document could not be retrieved.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// A page was unreachable, answered with a non-2xx status, or never settled.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// An element the protocol cannot do without was not rendered.
    #[error("missing element `{selector}` on {url}")]
    MissingElement { url: String, selector: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The browser process or its devtools connection misbehaved.
    #[error("browser error: {0}")]
    Browser(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

impl ScrapeError {
    pub fn navigation(url: &str, reason: impl ToString) -> Self {
        Self::Navigation {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn missing(url: &str, selector: &str) -> Self {
        Self::MissingElement {
            url: url.to_string(),
            selector: selector.to_string(),
        }
    }

    /// Short name of the failing step, used as a structured log field.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Navigation { .. } => "navigate",
            Self::MissingElement { .. } => "locate",
            Self::InvalidInput(_) => "input",
            Self::Browser(_) => "browser",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialize(_) => "serialize",
        }
    }
}
