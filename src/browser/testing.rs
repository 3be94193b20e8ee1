//! In-memory browser for tests.
//!
//! A [`FakeSite`] maps URLs to [`FakePage`]s. A page is a list of rendered states plus click
//! transitions between them; clicking an element that exists but has no transition keeps the
//! current state. Unknown URLs and URLs marked as broken fail navigation like a 404 would.

use super::{BrowserLauncher, BrowserSession};
use crate::error::ScrapeError;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct Transition {
    from: Option<usize>,
    selector: String,
    index: usize,
    to: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    states: Vec<String>,
    transitions: Vec<Transition>,
}

impl FakePage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            states: vec![html.into()],
            transitions: Vec::new(),
        }
    }

    /// Append a rendered state. States are numbered in insertion order, the initial one is 0.
    pub fn state(mut self, html: impl Into<String>) -> Self {
        self.states.push(html.into());
        self
    }

    /// Clicking `selector[index]` while in `from` (any state when `None`) renders state `to`.
    pub fn on_click(mut self, from: Option<usize>, selector: &str, index: usize, to: usize) -> Self {
        self.transitions.push(Transition {
            from,
            selector: selector.to_string(),
            index,
            to,
        });
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeSite {
    pages: HashMap<String, FakePage>,
    broken: HashSet<String>,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub clicks: AtomicUsize,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Navigation to `url` fails.
    pub fn broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    pub fn launcher(self) -> FakeLauncher {
        FakeLauncher {
            site: Arc::new(self),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeLauncher {
    pub site: Arc<FakeSite>,
}

impl FakeLauncher {
    pub fn opened(&self) -> usize {
        self.site.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.site.closed.load(Ordering::SeqCst)
    }
}

impl BrowserLauncher for FakeLauncher {
    type Session = FakeSession;

    async fn open(&self) -> Result<FakeSession, ScrapeError> {
        self.site.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            site: Arc::clone(&self.site),
            url: None,
            state: 0,
        })
    }
}

pub struct FakeSession {
    site: Arc<FakeSite>,
    url: Option<String>,
    state: usize,
}

impl FakeSession {
    fn page(&self) -> Result<&FakePage, ScrapeError> {
        self.url
            .as_ref()
            .and_then(|url| self.site.pages.get(url))
            .ok_or_else(|| ScrapeError::Browser("no page loaded".to_string()))
    }
}

impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError> {
        tokio::task::yield_now().await;
        if self.site.broken.contains(url) {
            return Err(ScrapeError::navigation(url, "net::ERR_CONNECTION_RESET"));
        }
        if !self.site.pages.contains_key(url) {
            return Err(ScrapeError::navigation(url, "HTTP 404"));
        }
        self.url = Some(url.to_string());
        self.state = 0;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, ScrapeError> {
        Ok(self.page()?.states[self.state].clone())
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, ScrapeError> {
        if script.contains("location.href") {
            return Ok(self
                .url
                .clone()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null));
        }
        Ok(serde_json::Value::Null)
    }

    async fn click(&mut self, selector: &str, index: usize) -> Result<bool, ScrapeError> {
        let page = self.page()?;
        let parsed = Selector::parse(selector)
            .map_err(|e| ScrapeError::Browser(format!("bad selector {selector}: {e}")))?;
        let exists = Html::parse_document(&page.states[self.state])
            .select(&parsed)
            .nth(index)
            .is_some();
        if !exists {
            return Ok(false);
        }

        let current = self.state;
        let next = page
            .transitions
            .iter()
            .find(|t| {
                t.selector == selector && t.index == index && t.from.is_none_or(|f| f == current)
            })
            .map(|t| t.to);
        if let Some(next) = next {
            self.state = next;
        }
        self.site.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn close(self) -> Result<(), ScrapeError> {
        self.site.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
