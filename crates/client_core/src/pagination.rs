//! Query session state, per-page result cache and navigation.
//!
//! The controller owns one query session at a time. Every navigation
//! either renders straight from the session cache or issues a page fetch and
//! renders once it resolves. Rendering means publishing [`ControllerEvent`]s;
//! a front end subscribes and draws whatever it receives.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use chrono::Utc;
use flag_integration::{FlagClient, MissingFlagClient};
use shared::{
    domain::{start_index, total_page_count, SessionId, FETCH_PAGE_ERROR_EVENT, MAX_VISIBLE_PAGES},
    protocol::{Book, FetchPageErrorPayload},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::{compute_page_window, AlertSink, FetchError, MissingAlertSink, SearchBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    Loading,
    Ready,
    Navigating(u32),
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchStats {
    pub total_results: u64,
    pub most_common_author: String,
    pub earliest_pub_date: String,
    pub latest_pub_date: String,
    /// Round-trip latency of the initial search, rounded to two decimals.
    pub elapsed_secs: f64,
}

impl SearchStats {
    pub fn elapsed_display(&self) -> String {
        format!("{:.2}", self.elapsed_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationView {
    pub current_page: u32,
    pub total_pages: u32,
    pub pages: Vec<u32>,
    pub prev_disabled: bool,
    pub next_disabled: bool,
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    SearchStarted { query: String },
    StatsPublished(SearchStats),
    ResultsRendered { page: u32, books: Vec<Book> },
    PaginationUpdated(PaginationView),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Loaded { total_pages: u32 },
    Failed,
    /// A newer query was submitted before this one resolved.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Rejected by a navigation guard; nothing changed.
    Ignored,
    CacheHit,
    Fetched,
    /// A fetch for this page is already outstanding.
    InFlight,
    /// Fetched, but the user moved on (or started a new query) before it
    /// resolved, so nothing was rendered.
    Stale,
    Failed { escalated: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub query: String,
    pub current_page: u32,
    pub displayed_page: Option<u32>,
    pub total_results: u64,
    pub total_pages: u32,
    pub cached_pages: Vec<u32>,
    pub in_flight_pages: Vec<u32>,
    pub phase: ControllerPhase,
}

struct QuerySession {
    generation: SessionId,
    query_text: String,
    current_page: u32,
    displayed_page: Option<u32>,
    total_result_count: u64,
    page_cache: HashMap<u32, Vec<Book>>,
    in_flight: HashSet<u32>,
    phase: ControllerPhase,
}

impl QuerySession {
    fn idle() -> Self {
        Self {
            generation: SessionId(0),
            query_text: String::new(),
            current_page: 1,
            displayed_page: None,
            total_result_count: 0,
            page_cache: HashMap::new(),
            in_flight: HashSet::new(),
            phase: ControllerPhase::Idle,
        }
    }

    /// Replaces the session wholesale for a new query.
    fn restart(&mut self, query_text: &str) -> SessionId {
        let generation = SessionId(self.generation.0 + 1);
        *self = Self {
            generation,
            query_text: query_text.to_string(),
            phase: ControllerPhase::Loading,
            ..Self::idle()
        };
        generation
    }

    fn total_pages(&self) -> u32 {
        total_page_count(self.total_result_count)
    }

    fn pagination_view(&self, max_visible: u32) -> PaginationView {
        let total_pages = self.total_pages();
        PaginationView {
            current_page: self.current_page,
            total_pages,
            pages: compute_page_window(self.current_page, total_pages, max_visible),
            prev_disabled: self.current_page <= 1,
            next_disabled: self.current_page >= total_pages,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let mut cached_pages: Vec<u32> = self.page_cache.keys().copied().collect();
        cached_pages.sort_unstable();
        let mut in_flight_pages: Vec<u32> = self.in_flight.iter().copied().collect();
        in_flight_pages.sort_unstable();
        SessionSnapshot {
            query: self.query_text.clone(),
            current_page: self.current_page,
            displayed_page: self.displayed_page,
            total_results: self.total_result_count,
            total_pages: self.total_pages(),
            cached_pages,
            in_flight_pages,
            phase: self.phase,
        }
    }
}

fn round_to_hundredths(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

pub struct PaginationController {
    backend: Arc<dyn SearchBackend>,
    alerts: Arc<dyn AlertSink>,
    flags: Arc<dyn FlagClient>,
    max_visible_pages: u32,
    inner: Mutex<QuerySession>,
    events: broadcast::Sender<ControllerEvent>,
}

impl PaginationController {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Arc<Self> {
        Self::new_with_dependencies(
            backend,
            Arc::new(MissingAlertSink),
            Arc::new(MissingFlagClient),
            MAX_VISIBLE_PAGES,
        )
    }

    pub fn new_with_dependencies(
        backend: Arc<dyn SearchBackend>,
        alerts: Arc<dyn AlertSink>,
        flags: Arc<dyn FlagClient>,
        max_visible_pages: u32,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            backend,
            alerts,
            flags,
            max_visible_pages,
            inner: Mutex::new(QuerySession::idle()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn cached_page(&self, page: u32) -> Option<Vec<Book>> {
        self.inner.lock().await.page_cache.get(&page).cloned()
    }

    /// Starts a new session for `text` and loads its first page along with
    /// the aggregate stats. The previous session's cache is dropped before
    /// the request goes out.
    pub async fn submit_query(&self, text: &str) -> SearchOutcome {
        let started_at = Instant::now();
        let generation = self.inner.lock().await.restart(text);
        info!(query = text, "search: fetching initial results");
        let _ = self.events.send(ControllerEvent::SearchStarted {
            query: text.to_string(),
        });

        let result = self.backend.search(text).await;

        let mut session = self.inner.lock().await;
        if session.generation != generation {
            debug!(query = text, "search: discarding response for superseded query");
            return SearchOutcome::Superseded;
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                session.phase = ControllerPhase::Error;
                error!(query = text, %err, "search: failed to fetch initial results");
                return SearchOutcome::Failed;
            }
        };

        session.total_result_count = response.total_items;
        session.page_cache.insert(1, response.books.clone());
        session.phase = ControllerPhase::Ready;
        let total_pages = session.total_pages();
        info!(
            query = text,
            total_results = response.total_items,
            total_pages,
            "search: initial results received"
        );

        let stats = SearchStats {
            total_results: response.total_items,
            most_common_author: response.most_common_author,
            earliest_pub_date: response.earliest_pub_date,
            latest_pub_date: response.latest_pub_date,
            elapsed_secs: round_to_hundredths(started_at.elapsed().as_secs_f64()),
        };
        let rendered = if session.current_page == 1 {
            session.displayed_page = Some(1);
            Some(session.pagination_view(self.max_visible_pages))
        } else {
            None
        };
        drop(session);

        let _ = self.events.send(ControllerEvent::StatsPublished(stats));
        if let Some(view) = rendered {
            self.render(1, response.books, view);
        }
        SearchOutcome::Loaded { total_pages }
    }

    /// Shows `page`, from cache when possible. Only last-page navigation
    /// passes `is_last_page`, which escalates a failed fetch.
    pub async fn go_to_page(&self, page: u32, is_last_page: bool) -> NavigationOutcome {
        self.inner.lock().await.current_page = page;
        self.load_page(page, is_last_page).await
    }

    pub async fn navigate_prev(&self) -> NavigationOutcome {
        let target = self
            .retarget(|session| (session.current_page > 1).then(|| session.current_page - 1))
            .await;
        match target {
            Some(page) => self.load_page(page, false).await,
            None => NavigationOutcome::Ignored,
        }
    }

    pub async fn navigate_next(&self) -> NavigationOutcome {
        let target = self
            .retarget(|session| {
                (session.current_page < session.total_pages()).then(|| session.current_page + 1)
            })
            .await;
        match target {
            Some(page) => self.load_page(page, false).await,
            None => NavigationOutcome::Ignored,
        }
    }

    pub async fn navigate_first(&self) -> NavigationOutcome {
        let target = self
            .retarget(|session| (session.current_page > 1).then_some(1))
            .await;
        match target {
            Some(page) => self.load_page(page, false).await,
            None => NavigationOutcome::Ignored,
        }
    }

    pub async fn navigate_last(&self) -> NavigationOutcome {
        let target = self
            .retarget(|session| {
                let total_pages = session.total_pages();
                (session.current_page < total_pages).then_some(total_pages)
            })
            .await;
        match target {
            Some(page) => self.load_page(page, true).await,
            None => NavigationOutcome::Ignored,
        }
    }

    /// Jumps to a numeral from the page window. Reaching the final page this
    /// way does not escalate failures; only [`Self::navigate_last`] does.
    pub async fn select_page_number(&self, page: u32) -> NavigationOutcome {
        let target = self
            .retarget(|session| (page >= 1 && page <= session.total_pages()).then_some(page))
            .await;
        match target {
            Some(page) => self.load_page(page, false).await,
            None => NavigationOutcome::Ignored,
        }
    }

    async fn retarget(&self, pick: impl FnOnce(&QuerySession) -> Option<u32>) -> Option<u32> {
        let mut session = self.inner.lock().await;
        let target = pick(&*session)?;
        session.current_page = target;
        Some(target)
    }

    async fn load_page(&self, page: u32, is_last_page: bool) -> NavigationOutcome {
        let (generation, query) = {
            let mut session = self.inner.lock().await;
            if let Some(books) = session.page_cache.get(&page).cloned() {
                session.phase = ControllerPhase::Ready;
                session.displayed_page = Some(page);
                let view = session.pagination_view(self.max_visible_pages);
                drop(session);
                debug!(page, "pagination: serving page from cache");
                self.render(page, books, view);
                return NavigationOutcome::CacheHit;
            }
            if !session.in_flight.insert(page) {
                debug!(page, "pagination: fetch already in flight");
                return NavigationOutcome::InFlight;
            }
            session.phase = ControllerPhase::Navigating(page);
            (session.generation, session.query_text.clone())
        };

        let start_index = start_index(page);
        info!(page, start_index, is_last_page, "pagination: fetching page");
        let result = self.backend.fetch_page(&query, start_index).await;

        match result {
            Ok(response) => {
                let mut session = self.inner.lock().await;
                if session.generation != generation {
                    debug!(page, "pagination: dropping page from superseded query");
                    return NavigationOutcome::Stale;
                }
                session.in_flight.remove(&page);
                session.page_cache.insert(page, response.books.clone());
                if session.current_page != page {
                    debug!(
                        page,
                        current_page = session.current_page,
                        "pagination: cached page without rendering; navigation moved on"
                    );
                    return NavigationOutcome::Stale;
                }
                session.phase = ControllerPhase::Ready;
                session.displayed_page = Some(page);
                let view = session.pagination_view(self.max_visible_pages);
                drop(session);
                self.render(page, response.books, view);
                NavigationOutcome::Fetched
            }
            Err(err) => {
                {
                    let mut session = self.inner.lock().await;
                    if session.generation == generation {
                        session.in_flight.remove(&page);
                        if session.current_page == page {
                            session.phase = ControllerPhase::Error;
                        }
                    }
                }
                error!(page, start_index, %err, "pagination: failed to fetch page results");
                if !is_last_page {
                    return NavigationOutcome::Failed { escalated: false };
                }
                self.escalate_last_page_failure(page, start_index, &query, &err)
                    .await;
                NavigationOutcome::Failed { escalated: true }
            }
        }
    }

    async fn escalate_last_page_failure(
        &self,
        page: u32,
        start_index: u64,
        query: &str,
        err: &FetchError,
    ) {
        let (text, detail) = if err.is_internal_server_error() {
            (
                format!(
                    "500 error occurred on last page fetch: Page {page}, Start Index {start_index}, Query {query}"
                ),
                "500 Internal Server Error".to_string(),
            )
        } else {
            (
                format!(
                    "Error occurred on last page fetch: Page {page}, Start Index {start_index}, Query {query}, Error: {err}"
                ),
                err.to_string(),
            )
        };
        warn!(page, start_index, query, "pagination: escalating last page failure");

        if let Err(alert_err) = self.alerts.send_alert(&text).await {
            error!(%alert_err, "alerts: failed to send last page failure alert");
        }

        let payload = FetchPageErrorPayload {
            page,
            start_index,
            query: query.to_string(),
            error: detail,
            occurred_at: Utc::now(),
        };
        let payload = match serde_json::to_value(&payload) {
            Ok(payload) => payload,
            Err(encode_err) => {
                error!(%encode_err, "flags: failed to encode fetch-page-error payload");
                return;
            }
        };
        if let Err(track_err) = self.flags.track(FETCH_PAGE_ERROR_EVENT, payload).await {
            error!(%track_err, "flags: failed to track fetch-page-error");
        }
    }

    fn render(&self, page: u32, books: Vec<Book>, view: PaginationView) {
        debug!(page, results = books.len(), "pagination: rendering page");
        let _ = self
            .events
            .send(ControllerEvent::ResultsRendered { page, books });
        let _ = self.events.send(ControllerEvent::PaginationUpdated(view));
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
