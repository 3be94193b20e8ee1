//! Chromium sessions over the DevTools protocol.
//!
//! Each [`ChromeSession`] owns its own browser process, its own throwaway profile directory and a
//! single page, mirroring the one-session-per-scrape model of the pipeline. Tuning is handed to
//! [`ChromeLauncher`] at construction instead of being set globally.
//!
//! Navigation waits for the page's `networkIdle` lifecycle event, so panels filled by late XHRs
//! are present before the DOM is read. A fixed quiet period is used when lifecycle events are
//! unavailable.

use super::{BrowserLauncher, BrowserSession};
use crate::error::ScrapeError;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, SetLifecycleEventsEnabledParams,
};
use futures::{Stream, StreamExt, future};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, warn};

static PROFILE_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Reads the HTTP status of the main document, `null` when the browser does not expose it.
const STATUS_SCRIPT: &str = r#"
    (() => {
        const entry = performance.getEntriesByType('navigation')[0];
        return entry && entry.responseStatus ? entry.responseStatus : null;
    })()
"#;

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Upper bound for a single navigation.
    pub navigation_timeout: Duration,
    /// Quiet period after the load event before the DOM is considered rendered.
    pub network_idle: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout: Duration::from_secs(60),
            network_idle: Duration::from_millis(500),
        }
    }
}

/// Fresh profile directory for one browser process.
///
/// Chromium locks its profile, so concurrent browsers sharing one would fail to start.
fn profile_dir() -> PathBuf {
    let n = PROFILE_SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("meal-scraper-{}-{n}", std::process::id()))
}

async fn remove_profile(profile: &Path) {
    match tokio::fs::remove_dir_all(profile).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(profile = %profile.display(), error = %e, "Failed to remove browser profile"),
    }
}

/// Consume lifecycle event names until the network went idle after a new document started.
///
/// Returns `false` when the stream ends or `limit` passes first.
async fn wait_for_network_idle<S>(events: S, limit: Duration) -> bool
where
    S: Stream<Item = String>,
{
    let idle = async move {
        let mut events = std::pin::pin!(events);
        let mut started = false;
        while let Some(name) = events.next().await {
            match name.as_str() {
                "init" => started = true,
                "networkIdle" if started => return true,
                _ => {}
            }
        }
        false
    };
    timeout(limit, idle).await.unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    settings: BrowserSettings,
}

impl ChromeLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

impl BrowserLauncher for ChromeLauncher {
    type Session = ChromeSession;

    #[instrument(level = "debug", skip_all)]
    async fn open(&self) -> Result<ChromeSession, ScrapeError> {
        let profile = profile_dir();
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.settings.navigation_timeout)
            .user_data_dir(&profile);
        if !self.settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(ScrapeError::Browser)?;

        let (mut browser, mut handler) = match Browser::launch(config).await {
            Ok(launched) => launched,
            Err(e) => {
                remove_profile(&profile).await;
                return Err(ScrapeError::Browser(e.to_string()));
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "DevTools handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                remove_profile(&profile).await;
                return Err(ScrapeError::Browser(e.to_string()));
            }
        };

        let lifecycle = match page.execute(SetLifecycleEventsEnabledParams::new(true)).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Lifecycle events unavailable; falling back to a fixed settle");
                false
            }
        };

        debug!(profile = %profile.display(), "Browser session opened");
        Ok(ChromeSession {
            browser,
            page,
            handler_task,
            profile,
            lifecycle,
            settings: self.settings.clone(),
        })
    }
}

pub struct ChromeSession {
    browser: Browser,
    page: chromiumoxide::Page,
    handler_task: JoinHandle<()>,
    profile: PathBuf,
    /// Lifecycle events were enabled on `page`.
    lifecycle: bool,
    settings: BrowserSettings,
}

impl BrowserSession for ChromeSession {
    #[instrument(level = "debug", skip(self))]
    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError> {
        // subscribe before navigating so the new document's events are not missed
        let lifecycle_events = if self.lifecycle {
            self.page.event_listener::<EventLifecycleEvent>().await.ok()
        } else {
            None
        };

        timeout(self.settings.navigation_timeout, self.page.goto(url))
            .await
            .map_err(|_| ScrapeError::navigation(url, "timed out"))?
            .map_err(|e| ScrapeError::navigation(url, e))?;

        let status = self
            .page
            .evaluate(STATUS_SCRIPT)
            .await
            .ok()
            .and_then(|result| result.into_value::<Option<u64>>().ok().flatten());
        if let Some(status) = status {
            if !(200..300).contains(&status) {
                return Err(ScrapeError::navigation(url, format!("HTTP {status}")));
            }
        }

        match lifecycle_events {
            Some(events) => {
                let main_frame = self.page.mainframe().await.ok().flatten();
                let names = events.filter_map(move |event| {
                    let in_main_frame = main_frame.as_ref().is_none_or(|f| *f == event.frame_id);
                    future::ready(in_main_frame.then(|| event.name.clone()))
                });
                if !wait_for_network_idle(names, self.settings.navigation_timeout).await {
                    warn!(%url, "Network never went idle; reading the page as rendered");
                }
            }
            None => sleep(self.settings.network_idle).await,
        }
        Ok(())
    }

    async fn content(&mut self) -> Result<String, ScrapeError> {
        self.page
            .content()
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, ScrapeError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn click(&mut self, selector: &str, index: usize) -> Result<bool, ScrapeError> {
        // DOM click rather than a synthesized mouse event: toggles may sit off-screen
        let script = format!(
            "(() => {{ const el = document.querySelectorAll({})[{index}]; \
             if (!el) return false; el.click(); return true; }})()",
            serde_json::to_string(selector)?
        );
        Ok(self.evaluate(&script).await?.as_bool().unwrap_or(false))
    }

    async fn close(mut self) -> Result<(), ScrapeError> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        remove_profile(&self.profile).await;
        closed
            .map(|_| debug!("Browser session closed"))
            .map_err(|e| ScrapeError::Browser(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn names(items: &[&str]) -> impl Stream<Item = String> {
        stream::iter(items.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_profile_dirs_are_unique_per_launch() {
        let first = profile_dir();
        let second = profile_dir();
        assert_ne!(first, second);
        assert!(first.starts_with(std::env::temp_dir()));
        assert!(
            first
                .to_string_lossy()
                .contains(&format!("meal-scraper-{}-", std::process::id()))
        );
    }

    #[tokio::test]
    async fn test_remove_profile_deletes_directory() {
        let profile = profile_dir();
        std::fs::create_dir_all(profile.join("Default")).unwrap();
        remove_profile(&profile).await;
        assert!(!profile.exists());
        // already gone: nothing to do
        remove_profile(&profile).await;
    }

    #[tokio::test]
    async fn test_waits_for_network_idle_after_new_document() {
        let events = names(&["init", "DOMContentLoaded", "load", "networkAlmostIdle", "networkIdle"]);
        assert!(wait_for_network_idle(events, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_idle_from_previous_document_is_ignored() {
        let events = names(&["networkIdle", "init", "load"]);
        assert!(!wait_for_network_idle(events, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_network_idle_wait_is_bounded() {
        let events = stream::pending::<String>();
        assert!(!wait_for_network_idle(events, Duration::from_millis(20)).await);
    }
}
