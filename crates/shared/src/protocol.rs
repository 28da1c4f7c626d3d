use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NO_DESCRIPTION: &str = "No description available.";

/// One search hit as the browser displays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub authors: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

impl Book {
    pub fn description_or_default(&self) -> &str {
        self.description
            .as_deref()
            .filter(|text| !text.is_empty())
            .unwrap_or(NO_DESCRIPTION)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub books: Vec<Book>,
    pub total_items: u64,
    pub most_common_author: String,
    pub earliest_pub_date: String,
    pub latest_pub_date: String,
    #[serde(default)]
    pub response_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub books: Vec<Book>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub start_index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackMessageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackMessageResponse {
    pub status: String,
}

/// Analytics payload recorded against the flag service when a last-page
/// fetch fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchPageErrorPayload {
    pub page: u32,
    pub start_index: u64,
    pub query: String,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}
