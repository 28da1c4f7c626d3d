//! Upstream volumes API (Google Books) and the reduction of its payload
//! into browser-facing book records and aggregate stats.

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use shared::{domain::PAGE_SIZE, protocol::Book};
use thiserror::Error;
use tracing::{info, warn};

const UNKNOWN_AUTHOR: &str = "Unknown Author";
const NO_TITLE: &str = "No Title";
const UNKNOWN_DATE: &str = "Unknown Date";
const NO_AUTHOR: &str = "No Author";
const NO_DATE: &str = "N/A";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("volumes API responded with status {0}")]
    Status(u16),
    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumesPayload {
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub items: Vec<VolumeItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeItem {
    #[serde(default)]
    pub volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub published_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedBooks {
    pub books: Vec<Book>,
    pub most_common_author: String,
    pub earliest_pub_date: String,
    pub latest_pub_date: String,
}

#[derive(Clone)]
pub struct VolumesClient {
    http: Client,
    api_url: String,
}

impl VolumesClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_url: api_url.into(),
        }
    }

    /// Fetches one page of volumes for `query` starting at `start_index`.
    pub async fn fetch(&self, query: &str, start_index: u64) -> Result<VolumesPayload, UpstreamError> {
        info!(query, start_index, "volumes: fetching upstream page");
        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("q", query.to_string()),
                ("startIndex", start_index.to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(status = status.as_u16(), "volumes: upstream request failed");
            return Err(UpstreamError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

fn format_authors(authors: &[String]) -> String {
    if authors.is_empty() {
        UNKNOWN_AUTHOR.to_string()
    } else {
        authors.join(", ")
    }
}

/// Most frequent individual author; the earliest seen wins a tie.
fn most_common_author<'a>(authors: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, author) in authors.into_iter().enumerate() {
        counts.entry(author).or_insert((0, position)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(author, _)| author)
}

pub fn process_books_data(items: &[VolumeItem]) -> ProcessedBooks {
    let books = items
        .iter()
        .map(|item| {
            let info = &item.volume_info;
            Book {
                authors: format_authors(&info.authors),
                title: info.title.clone().unwrap_or_else(|| NO_TITLE.to_string()),
                description: Some(
                    info.description
                        .clone()
                        .unwrap_or_else(|| shared::protocol::NO_DESCRIPTION.to_string()),
                ),
                published_date: Some(
                    info.published_date
                        .clone()
                        .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
                ),
            }
        })
        .collect();

    let most_common_author = most_common_author(
        items
            .iter()
            .flat_map(|item| item.volume_info.authors.iter().map(String::as_str)),
    )
    .unwrap_or(NO_AUTHOR)
    .to_string();

    let dates = || {
        items
            .iter()
            .filter_map(|item| item.volume_info.published_date.as_deref())
            .filter(|date| *date != UNKNOWN_DATE)
    };

    ProcessedBooks {
        books,
        most_common_author,
        earliest_pub_date: dates().min().unwrap_or(NO_DATE).to_string(),
        latest_pub_date: dates().max().unwrap_or(NO_DATE).to_string(),
    }
}

#[cfg(test)]
#[path = "tests/volumes_tests.rs"]
mod tests;
