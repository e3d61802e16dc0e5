//! Page title lookup used when a bookmark is added without a title.

use crate::config::Config;
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tl::ParserOptions;

/// Looks up a display title for a url.
///
/// Implementations bound their own latency and never fail: anything that goes
/// wrong is reported as `None` and the caller falls back to the hostname.
pub trait TitleFetcher: Send + Sync {
    fn fetch_title(&self, url: &str) -> impl Future<Output = Option<String>> + Send;
}

impl<T: TitleFetcher> TitleFetcher for Arc<T> {
    fn fetch_title(&self, url: &str) -> impl Future<Output = Option<String>> + Send {
        (**self).fetch_title(url)
    }
}

/// Soft failures of a title fetch. Logged, never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("page has no title")]
    NoTitle,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Fetcher for offline use: never finds a title.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl TitleFetcher for OfflineFetcher {
    async fn fetch_title(&self, _url: &str) -> Option<String> {
        None
    }
}

/// Scrapes `<title>` from the page over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTitleFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpTitleFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> crate::error::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        Self::new(&config.user_agent, config.title_fetch_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;

        // Error pages often carry a usable title too
        let status = resp.status();
        if !status.is_success() {
            log::debug!("{} answered {}, reading its title anyway", url, status);
        }

        let body = resp.text().await?;
        parse_title(&body).ok_or(FetchError::NoTitle)
    }
}

impl TitleFetcher for HttpTitleFetcher {
    async fn fetch_title(&self, url: &str) -> Option<String> {
        let outcome = match tokio::time::timeout(self.timeout, self.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(title) => {
                log::debug!("Fetched title for {}: {}", url, title);
                Some(title)
            }
            Err(e) => {
                log::debug!("Failed to fetch title for {}: {}", url, e);
                None
            }
        }
    }
}

/// Extract the first `<title>` of an HTML document, whitespace collapsed.
pub fn parse_title(html: &str) -> Option<String> {
    let dom = tl::parse(html, ParserOptions::default()).ok()?;
    let parser = dom.parser();

    let title = dom
        .query_selector("title")
        .and_then(|mut iter| iter.next())
        .and_then(|handle| handle.get(parser))
        .map(|node| node.inner_text(parser).to_string())?;

    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}
