use std::time::Instant;

use axum::http::StatusCode;
use shared::{
    error::{ApiException, ErrorCode},
    protocol::{PageResponse, SearchResponse, SlackMessageResponse},
};
use tracing::{error, info};

use crate::{
    app_state::AppState,
    slack::SlackRelayError,
    volumes::{process_books_data, UpstreamError},
};

const DEFAULT_SLACK_TEXT: &str = "No message provided";

pub fn search_route() -> &'static str {
    "/search"
}

pub fn fetch_page_route() -> &'static str {
    "/fetch_page"
}

pub fn send_slack_message_route() -> &'static str {
    "/send_slack_message"
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Upstream | ErrorCode::Unavailable | ErrorCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn require_query(query: &str) -> Result<&str, ApiException> {
    if query.is_empty() {
        return Err(ApiException::new(
            ErrorCode::Validation,
            "Query parameter is required",
        ));
    }
    Ok(query)
}

fn upstream(err: UpstreamError) -> ApiException {
    error!(%err, "volumes: upstream failure");
    match err {
        UpstreamError::Status(_) => ApiException::new(
            ErrorCode::Upstream,
            "Failed to fetch data from Google Books API",
        ),
        UpstreamError::Request(err) => ApiException::new(
            ErrorCode::Upstream,
            format!("Failed to fetch data from Google Books API: {err}"),
        ),
    }
}

pub(crate) async fn search_books(
    state: &AppState,
    query: &str,
) -> Result<SearchResponse, ApiException> {
    let query = require_query(query)?;
    let started_at = Instant::now();
    let payload = state.volumes.fetch(query, 0).await.map_err(upstream)?;
    let response_time = started_at.elapsed().as_secs_f64();

    let processed = process_books_data(&payload.items);
    info!(
        query,
        total_items = payload.total_items,
        returned = processed.books.len(),
        "search: served initial page"
    );
    Ok(SearchResponse {
        books: processed.books,
        total_items: payload.total_items,
        most_common_author: processed.most_common_author,
        earliest_pub_date: processed.earliest_pub_date,
        latest_pub_date: processed.latest_pub_date,
        response_time,
    })
}

pub(crate) async fn fetch_page(
    state: &AppState,
    query: &str,
    start_index: u64,
) -> Result<PageResponse, ApiException> {
    let query = require_query(query)?;
    info!(query, start_index, "search: fetching page");
    let payload = state
        .volumes
        .fetch(query, start_index)
        .await
        .map_err(upstream)?;
    Ok(PageResponse {
        books: process_books_data(&payload.items).books,
    })
}

pub(crate) async fn relay_slack_message(
    state: &AppState,
    text: Option<&str>,
) -> Result<SlackMessageResponse, ApiException> {
    let text = text.unwrap_or(DEFAULT_SLACK_TEXT);
    state.slack.send(text).await.map_err(|err| {
        error!(%err, "slack: relay failed");
        match err {
            SlackRelayError::NotConfigured => {
                ApiException::new(ErrorCode::Unavailable, "Slack webhook is not configured")
            }
            SlackRelayError::Status(_) => {
                ApiException::new(ErrorCode::Upstream, "Failed to send Slack message")
            }
            SlackRelayError::Request(err) => ApiException::new(
                ErrorCode::Upstream,
                format!("Failed to send Slack message: {err}"),
            ),
        }
    })?;
    Ok(SlackMessageResponse {
        status: "Message sent successfully".to_string(),
    })
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
