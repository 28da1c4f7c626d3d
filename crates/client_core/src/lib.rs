use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use shared::protocol::{PageQuery, PageResponse, SearchQuery, SearchResponse, SlackMessageRequest};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub mod flags;
pub mod page_window;
pub mod pagination;

pub use flags::{AffordanceVisibility, FlagReconciler};
pub use page_window::compute_page_window;
pub use pagination::{
    ControllerEvent, ControllerPhase, NavigationOutcome, PaginationController, PaginationView,
    SearchOutcome, SearchStats, SessionSnapshot,
};

const SEARCH_ROUTE: &str = "search";
const FETCH_PAGE_ROUTE: &str = "fetch_page";
const SEND_SLACK_MESSAGE_ROUTE: &str = "send_slack_message";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("network request failed: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    pub fn is_internal_server_error(&self) -> bool {
        matches!(self, FetchError::Status(500))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return FetchError::Status(status.as_u16());
        }
        if err.is_decode() {
            return FetchError::Decode(err.to_string());
        }
        FetchError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResponse, FetchError>;
    async fn fetch_page(&self, query: &str, start_index: u64) -> Result<PageResponse, FetchError>;
}

/// Fire-and-forget notification channel for escalated failures.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, text: &str) -> anyhow::Result<()>;
}

pub struct MissingAlertSink;

#[async_trait]
impl AlertSink for MissingAlertSink {
    async fn send_alert(&self, _text: &str) -> anyhow::Result<()> {
        Err(anyhow!("alert channel is unavailable"))
    }
}

/// Talks to the search proxy: `/search`, `/fetch_page` and the
/// `/send_slack_message` relay.
pub struct HttpSearchClient {
    http: Client,
    base_url: Url,
}

impl HttpSearchClient {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let mut base_url =
            Url::parse(base_url).map_err(|err| FetchError::InvalidUrl(format!("{base_url}: {err}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, route: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(route)
            .map_err(|err| FetchError::InvalidUrl(format!("{route}: {err}")))
    }
}

#[async_trait]
impl SearchBackend for HttpSearchClient {
    async fn search(&self, query: &str) -> Result<SearchResponse, FetchError> {
        let url = self.endpoint(SEARCH_ROUTE)?;
        debug!(%url, query, "search: GET");
        let response: SearchResponse = self
            .http
            .get(url)
            .query(&SearchQuery {
                q: query.to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }

    async fn fetch_page(&self, query: &str, start_index: u64) -> Result<PageResponse, FetchError> {
        let url = self.endpoint(FETCH_PAGE_ROUTE)?;
        debug!(%url, query, start_index, "search: GET page");
        let response: PageResponse = self
            .http
            .get(url)
            .query(&PageQuery {
                q: query.to_string(),
                start_index,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl AlertSink for HttpSearchClient {
    async fn send_alert(&self, text: &str) -> anyhow::Result<()> {
        let url = self.endpoint(SEND_SLACK_MESSAGE_ROUTE)?;
        self.http
            .post(url)
            .json(&SlackMessageRequest {
                text: text.to_string(),
            })
            .send()
            .await?
            .error_for_status()?;
        info!("alerts: message relayed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
