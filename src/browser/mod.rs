//! Scriptable browser sessions.
//!
//! Menus and nutrition panels are rendered client-side, so every page goes through a real
//! browser. The scrapers only talk to the two traits below:
//!
//! - [`BrowserLauncher`] opens a fresh, unshared [`BrowserSession`]
//! - [`BrowserSession`] navigates, returns the rendered DOM, runs scripts and clicks
//!
//! [`chrome::ChromeLauncher`] is the production implementation. Tests use the in-memory
//! launcher from `testing`.
//!
//! Every session must be closed on every exit path; [`close_quietly`] is the helper the
//! scrapers call once their work on a session is over, whatever its outcome.

pub mod chrome;
#[cfg(test)]
pub mod testing;

use crate::error::ScrapeError;
use tracing::warn;

/// One isolated page in one browser.
pub trait BrowserSession {
    /// Load `url` and wait until the page settled. Fails on non-2xx status or timeout.
    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError>;

    /// Serialized DOM as currently rendered.
    async fn content(&mut self) -> Result<String, ScrapeError>;

    /// Run a script in page context and return its JSON result.
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, ScrapeError>;

    /// Click the `index`-th element matching `selector`.
    ///
    /// Returns `Ok(false)` when there is no such element.
    async fn click(&mut self, selector: &str, index: usize) -> Result<bool, ScrapeError>;

    async fn close(self) -> Result<(), ScrapeError>;

    /// URL of the document after redirects.
    async fn current_url(&mut self) -> Result<String, ScrapeError> {
        match self.evaluate("document.location.href").await? {
            serde_json::Value::String(url) => Ok(url),
            other => Err(ScrapeError::Browser(format!(
                "unexpected location value: {other}"
            ))),
        }
    }
}

pub trait BrowserLauncher {
    type Session: BrowserSession;

    async fn open(&self) -> Result<Self::Session, ScrapeError>;
}

/// Close a session, logging instead of failing when teardown goes wrong.
pub async fn close_quietly<S: BrowserSession>(session: S, url: &str) {
    if let Err(e) = session.close().await {
        warn!(%url, error = %e, "Failed to close browser session");
    }
}
