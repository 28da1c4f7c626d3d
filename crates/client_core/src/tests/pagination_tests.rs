use super::*;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use flag_integration::LocalFlagClient;
use shared::protocol::{PageResponse, SearchResponse};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy)]
enum Failure {
    Status(u16),
    Transport,
}

impl Failure {
    fn to_error(self) -> FetchError {
        match self {
            Failure::Status(code) => FetchError::Status(code),
            Failure::Transport => FetchError::Transport("connection refused".to_string()),
        }
    }
}

struct FakeBackend {
    total_items: u64,
    search_failure: Mutex<Option<Failure>>,
    page_failure: Mutex<Option<Failure>>,
    search_calls: Mutex<Vec<String>>,
    page_calls: Mutex<Vec<(String, u64)>>,
    search_gate: Mutex<Option<Arc<Notify>>>,
    page_gates: Mutex<HashMap<u64, Arc<Notify>>>,
}

impl FakeBackend {
    fn with_total(total_items: u64) -> Arc<Self> {
        Arc::new(Self {
            total_items,
            search_failure: Mutex::new(None),
            page_failure: Mutex::new(None),
            search_calls: Mutex::new(Vec::new()),
            page_calls: Mutex::new(Vec::new()),
            search_gate: Mutex::new(None),
            page_gates: Mutex::new(HashMap::new()),
        })
    }

    fn books(&self, query: &str, start_index: u64) -> Vec<Book> {
        let end = self.total_items.min(start_index + 10);
        (start_index..end)
            .map(|index| Book {
                authors: "Octavia E. Butler".to_string(),
                title: format!("{query} #{index}"),
                description: Some(format!("description {index}")),
                published_date: Some("1993".to_string()),
            })
            .collect()
    }

    async fn fail_pages_with(&self, failure: Failure) {
        *self.page_failure.lock().await = Some(failure);
    }

    async fn gate_search(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.search_gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    async fn gate_page(&self, start_index: u64) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.page_gates
            .lock()
            .await
            .insert(start_index, Arc::clone(&gate));
        gate
    }

    async fn page_call_count(&self) -> usize {
        self.page_calls.lock().await.len()
    }
}

#[async_trait]
impl SearchBackend for FakeBackend {
    async fn search(&self, query: &str) -> Result<SearchResponse, FetchError> {
        self.search_calls.lock().await.push(query.to_string());
        let gate = self.search_gate.lock().await.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(failure) = *self.search_failure.lock().await {
            return Err(failure.to_error());
        }
        Ok(SearchResponse {
            books: self.books(query, 0),
            total_items: self.total_items,
            most_common_author: "Octavia E. Butler".to_string(),
            earliest_pub_date: "1979".to_string(),
            latest_pub_date: "1998".to_string(),
            response_time: 0.1,
        })
    }

    async fn fetch_page(&self, query: &str, start_index: u64) -> Result<PageResponse, FetchError> {
        self.page_calls
            .lock()
            .await
            .push((query.to_string(), start_index));
        let gate = self.page_gates.lock().await.remove(&start_index);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(failure) = *self.page_failure.lock().await {
            return Err(failure.to_error());
        }
        Ok(PageResponse {
            books: self.books(query, start_index),
        })
    }
}

#[derive(Default)]
struct RecordingAlertSink {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send_alert(&self, text: &str) -> Result<()> {
        self.messages.lock().await.push(text.to_string());
        Ok(())
    }
}

struct Harness {
    backend: Arc<FakeBackend>,
    alerts: Arc<RecordingAlertSink>,
    flags: Arc<LocalFlagClient>,
    controller: Arc<PaginationController>,
}

fn harness(total_items: u64) -> Harness {
    let backend = FakeBackend::with_total(total_items);
    let alerts = Arc::new(RecordingAlertSink::default());
    let flags = Arc::new(LocalFlagClient::new("user1"));
    flags.mark_ready();
    let controller = PaginationController::new_with_dependencies(
        Arc::clone(&backend) as Arc<dyn SearchBackend>,
        Arc::clone(&alerts) as Arc<dyn AlertSink>,
        Arc::clone(&flags) as Arc<dyn FlagClient>,
        MAX_VISIBLE_PAGES,
    );
    Harness {
        backend,
        alerts,
        flags,
        controller,
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn submit_query_loads_first_page_and_derives_page_count() {
    let h = harness(95);

    let outcome = h.controller.submit_query("kindred").await;

    assert_eq!(outcome, SearchOutcome::Loaded { total_pages: 10 });
    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.query, "kindred");
    assert_eq!(snapshot.current_page, 1);
    assert_eq!(snapshot.displayed_page, Some(1));
    assert_eq!(snapshot.total_results, 95);
    assert_eq!(snapshot.total_pages, 10);
    assert_eq!(snapshot.cached_pages, vec![1]);
    assert_eq!(snapshot.phase, ControllerPhase::Ready);
    assert_eq!(h.backend.page_call_count().await, 0);
}

#[tokio::test]
async fn submit_query_publishes_stats_results_and_pagination() {
    let h = harness(95);
    let mut events = h.controller.subscribe_events();

    h.controller.submit_query("kindred").await;

    let ControllerEvent::SearchStarted { query } = events.recv().await.expect("event") else {
        panic!("expected search started");
    };
    assert_eq!(query, "kindred");

    let ControllerEvent::StatsPublished(stats) = events.recv().await.expect("event") else {
        panic!("expected stats");
    };
    assert_eq!(stats.total_results, 95);
    assert_eq!(stats.most_common_author, "Octavia E. Butler");
    assert_eq!(stats.earliest_pub_date, "1979");
    assert_eq!(stats.latest_pub_date, "1998");
    assert_eq!(stats.elapsed_secs, (stats.elapsed_secs * 100.0).round() / 100.0);
    assert_eq!(stats.elapsed_display().split('.').nth(1).map(str::len), Some(2));

    let ControllerEvent::ResultsRendered { page, books } = events.recv().await.expect("event")
    else {
        panic!("expected results");
    };
    assert_eq!(page, 1);
    assert_eq!(books.len(), 10);

    let ControllerEvent::PaginationUpdated(view) = events.recv().await.expect("event") else {
        panic!("expected pagination");
    };
    assert_eq!(view.pages, vec![1, 2, 3, 4, 5, 6, 7]);
    assert!(view.prev_disabled);
    assert!(!view.next_disabled);
}

#[tokio::test]
async fn cache_is_empty_while_initial_search_is_pending() {
    let h = harness(95);
    h.controller.submit_query("first").await;
    h.controller.select_page_number(3).await;
    assert_eq!(h.controller.snapshot().await.cached_pages, vec![1, 3]);

    let gate = h.backend.gate_search().await;
    let controller = Arc::clone(&h.controller);
    let pending = tokio::spawn(async move { controller.submit_query("second").await });
    let backend = Arc::clone(&h.backend);
    wait_until(|| {
        let backend = Arc::clone(&backend);
        async move { backend.search_calls.lock().await.len() == 2 }
    })
    .await;

    let snapshot = h.controller.snapshot().await;
    assert!(snapshot.cached_pages.is_empty());
    assert_eq!(snapshot.phase, ControllerPhase::Loading);
    assert_eq!(snapshot.query, "second");

    gate.notify_one();
    assert_eq!(
        pending.await.expect("join"),
        SearchOutcome::Loaded { total_pages: 10 }
    );
    assert_eq!(h.controller.snapshot().await.cached_pages, vec![1]);
}

#[tokio::test]
async fn superseded_search_response_is_discarded() {
    let h = harness(95);
    let gate = h.backend.gate_search().await;
    let controller = Arc::clone(&h.controller);
    let slow = tokio::spawn(async move { controller.submit_query("slow").await });
    let backend = Arc::clone(&h.backend);
    wait_until(|| {
        let backend = Arc::clone(&backend);
        async move { backend.search_calls.lock().await.len() == 1 }
    })
    .await;

    assert_eq!(
        h.controller.submit_query("fast").await,
        SearchOutcome::Loaded { total_pages: 10 }
    );
    gate.notify_one();

    assert_eq!(slow.await.expect("join"), SearchOutcome::Superseded);
    let page = h.controller.cached_page(1).await.expect("page 1");
    assert_eq!(page[0].title, "fast #0");
}

#[tokio::test]
async fn cached_page_is_served_without_another_request() {
    let h = harness(95);
    h.controller.submit_query("dawn").await;

    assert_eq!(h.controller.go_to_page(2, false).await, NavigationOutcome::Fetched);
    assert_eq!(h.controller.go_to_page(2, false).await, NavigationOutcome::CacheHit);

    assert_eq!(h.backend.page_call_count().await, 1);
    assert_eq!(
        *h.backend.page_calls.lock().await,
        vec![("dawn".to_string(), 10)]
    );
}

#[tokio::test]
async fn first_page_is_served_from_initial_search_cache() {
    let h = harness(95);
    h.controller.submit_query("dawn").await;
    h.controller.navigate_next().await;

    assert_eq!(h.controller.navigate_first().await, NavigationOutcome::CacheHit);
    assert_eq!(h.controller.snapshot().await.current_page, 1);
    assert_eq!(h.backend.page_call_count().await, 1);
}

#[tokio::test]
async fn new_query_discards_previous_cache() {
    let h = harness(95);
    h.controller.submit_query("a").await;
    assert_eq!(h.controller.select_page_number(3).await, NavigationOutcome::Fetched);

    h.controller.submit_query("b").await;
    assert_eq!(h.controller.select_page_number(3).await, NavigationOutcome::Fetched);

    assert_eq!(
        *h.backend.page_calls.lock().await,
        vec![("a".to_string(), 20), ("b".to_string(), 20)]
    );
}

#[tokio::test]
async fn navigation_guards_reject_out_of_range_moves() {
    let h = harness(25);
    assert_eq!(h.controller.navigate_next().await, NavigationOutcome::Ignored);
    assert_eq!(h.controller.navigate_last().await, NavigationOutcome::Ignored);

    h.controller.submit_query("parable").await;
    assert_eq!(h.controller.navigate_prev().await, NavigationOutcome::Ignored);
    assert_eq!(h.controller.navigate_first().await, NavigationOutcome::Ignored);
    assert_eq!(h.controller.select_page_number(0).await, NavigationOutcome::Ignored);
    assert_eq!(h.controller.select_page_number(4).await, NavigationOutcome::Ignored);

    assert_eq!(h.controller.navigate_last().await, NavigationOutcome::Fetched);
    assert_eq!(h.controller.snapshot().await.current_page, 3);
    assert_eq!(h.controller.navigate_next().await, NavigationOutcome::Ignored);
    assert_eq!(h.controller.navigate_last().await, NavigationOutcome::Ignored);
    assert_eq!(h.backend.page_call_count().await, 1);
}

#[tokio::test]
async fn next_and_prev_step_one_page() {
    let h = harness(95);
    h.controller.submit_query("wild seed").await;

    h.controller.navigate_next().await;
    h.controller.navigate_next().await;
    assert_eq!(h.controller.snapshot().await.current_page, 3);

    assert_eq!(h.controller.navigate_prev().await, NavigationOutcome::CacheHit);
    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.current_page, 2);
    assert_eq!(snapshot.displayed_page, Some(2));
    assert_eq!(snapshot.cached_pages, vec![1, 2, 3]);
}

#[tokio::test]
async fn last_page_500_sends_one_alert_and_one_analytics_event() {
    let h = harness(95);
    h.controller.submit_query("fledgling").await;
    h.backend.fail_pages_with(Failure::Status(500)).await;

    assert_eq!(
        h.controller.navigate_last().await,
        NavigationOutcome::Failed { escalated: true }
    );

    let messages = h.alerts.messages.lock().await.clone();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("500 error occurred on last page fetch"));
    assert!(messages[0].contains("Page 10"));
    assert!(messages[0].contains("Start Index 90"));
    assert!(messages[0].contains("fledgling"));

    let tracked = h.flags.tracked_events();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].key, FETCH_PAGE_ERROR_EVENT);
    assert_eq!(tracked[0].payload["page"], 10);
    assert_eq!(tracked[0].payload["startIndex"], 90);
    assert_eq!(tracked[0].payload["query"], "fledgling");
    assert_eq!(tracked[0].payload["error"], "500 Internal Server Error");

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.current_page, 10);
    assert_eq!(snapshot.displayed_page, Some(1));
    assert_eq!(snapshot.cached_pages, vec![1]);
    assert_eq!(snapshot.phase, ControllerPhase::Error);
}

#[tokio::test]
async fn prev_and_next_failures_are_not_escalated() {
    let h = harness(95);
    h.controller.submit_query("fledgling").await;
    h.backend.fail_pages_with(Failure::Status(500)).await;

    h.controller.navigate_last().await;
    assert_eq!(
        h.controller.navigate_prev().await,
        NavigationOutcome::Failed { escalated: false }
    );
    assert_eq!(
        h.controller.navigate_next().await,
        NavigationOutcome::Failed { escalated: false }
    );

    assert_eq!(h.alerts.messages.lock().await.len(), 1);
    assert_eq!(h.flags.tracked_events().len(), 1);
}

#[tokio::test]
async fn selecting_final_numeral_does_not_escalate() {
    let h = harness(45);
    h.controller.submit_query("imago").await;
    h.backend.fail_pages_with(Failure::Status(500)).await;

    assert_eq!(
        h.controller.select_page_number(5).await,
        NavigationOutcome::Failed { escalated: false }
    );
    assert!(h.alerts.messages.lock().await.is_empty());
    assert!(h.flags.tracked_events().is_empty());
}

#[tokio::test]
async fn last_page_network_failure_reports_error_detail() {
    let h = harness(95);
    h.controller.submit_query("clay's ark").await;
    h.backend.fail_pages_with(Failure::Transport).await;

    h.controller.navigate_last().await;

    let messages = h.alerts.messages.lock().await.clone();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Error occurred on last page fetch"));
    assert!(messages[0].contains("Error: network request failed: connection refused"));
    let tracked = h.flags.tracked_events();
    assert_eq!(
        tracked[0].payload["error"],
        "network request failed: connection refused"
    );
}

#[tokio::test]
async fn escalation_survives_unavailable_collaborators() {
    let backend = FakeBackend::with_total(95);
    let controller = PaginationController::new(Arc::clone(&backend) as Arc<dyn SearchBackend>);
    controller.submit_query("mind of my mind").await;
    backend.fail_pages_with(Failure::Status(500)).await;

    assert_eq!(
        controller.navigate_last().await,
        NavigationOutcome::Failed { escalated: true }
    );
    assert!(controller.snapshot().await.in_flight_pages.is_empty());
}

#[tokio::test]
async fn initial_search_failure_is_not_escalated() {
    let h = harness(95);
    *h.backend.search_failure.lock().await = Some(Failure::Status(500));

    assert_eq!(h.controller.submit_query("").await, SearchOutcome::Failed);

    let snapshot = h.controller.snapshot().await;
    assert!(snapshot.cached_pages.is_empty());
    assert_eq!(snapshot.total_pages, 0);
    assert_eq!(snapshot.phase, ControllerPhase::Error);
    assert!(h.alerts.messages.lock().await.is_empty());
    assert!(h.flags.tracked_events().is_empty());
    assert_eq!(*h.backend.search_calls.lock().await, vec![String::new()]);
}

#[tokio::test]
async fn repeated_clicks_do_not_duplicate_in_flight_fetch() {
    let h = harness(95);
    h.controller.submit_query("lilith").await;
    let gate = h.backend.gate_page(10).await;

    let controller = Arc::clone(&h.controller);
    let first = tokio::spawn(async move { controller.go_to_page(2, false).await });
    let backend = Arc::clone(&h.backend);
    wait_until(|| {
        let backend = Arc::clone(&backend);
        async move { backend.page_call_count().await == 1 }
    })
    .await;

    assert_eq!(h.controller.go_to_page(2, false).await, NavigationOutcome::InFlight);
    assert_eq!(h.controller.snapshot().await.in_flight_pages, vec![2]);

    gate.notify_one();
    assert_eq!(first.await.expect("join"), NavigationOutcome::Fetched);
    assert_eq!(h.backend.page_call_count().await, 1);
    assert!(h.controller.snapshot().await.in_flight_pages.is_empty());
}

#[tokio::test]
async fn slow_response_for_abandoned_page_is_cached_but_not_rendered() {
    let h = harness(95);
    h.controller.submit_query("adulthood rites").await;
    let gate = h.backend.gate_page(10).await;
    let mut events = h.controller.subscribe_events();

    let controller = Arc::clone(&h.controller);
    let slow = tokio::spawn(async move { controller.navigate_next().await });
    let backend = Arc::clone(&h.backend);
    wait_until(|| {
        let backend = Arc::clone(&backend);
        async move { backend.page_call_count().await == 1 }
    })
    .await;

    assert_eq!(h.controller.select_page_number(3).await, NavigationOutcome::Fetched);
    gate.notify_one();
    assert_eq!(slow.await.expect("join"), NavigationOutcome::Stale);

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.current_page, 3);
    assert_eq!(snapshot.displayed_page, Some(3));
    assert_eq!(snapshot.cached_pages, vec![1, 2, 3]);

    let mut rendered_pages = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ControllerEvent::ResultsRendered { page, .. } = event {
            rendered_pages.push(page);
        }
    }
    assert_eq!(rendered_pages, vec![3]);
}

#[tokio::test]
async fn page_from_previous_query_never_enters_new_cache() {
    let h = harness(95);
    h.controller.submit_query("old").await;
    let gate = h.backend.gate_page(10).await;

    let controller = Arc::clone(&h.controller);
    let slow = tokio::spawn(async move { controller.navigate_next().await });
    let backend = Arc::clone(&h.backend);
    wait_until(|| {
        let backend = Arc::clone(&backend);
        async move { backend.page_call_count().await == 1 }
    })
    .await;

    h.controller.submit_query("new").await;
    gate.notify_one();

    assert_eq!(slow.await.expect("join"), NavigationOutcome::Stale);
    assert_eq!(h.controller.snapshot().await.cached_pages, vec![1]);
}

#[tokio::test]
async fn pagination_view_tracks_window_and_disabled_controls() {
    let h = harness(200);
    h.controller.submit_query("xenogenesis").await;
    let mut events = h.controller.subscribe_events();

    h.controller.navigate_last().await;

    let mut last_view = None;
    while let Ok(event) = events.try_recv() {
        if let ControllerEvent::PaginationUpdated(view) = event {
            last_view = Some(view);
        }
    }
    let view = last_view.expect("pagination view");
    assert_eq!(view.current_page, 20);
    assert_eq!(view.total_pages, 20);
    assert_eq!(view.pages, (14..=20).collect::<Vec<_>>());
    assert!(!view.prev_disabled);
    assert!(view.next_disabled);
}
