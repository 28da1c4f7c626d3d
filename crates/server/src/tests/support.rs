use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};

use crate::{app_state::AppState, slack::SlackRelay, volumes::VolumesClient};

pub(crate) const TOTAL_ITEMS: u64 = 42;
pub(crate) const FAILING_QUERY: &str = "boom";
pub(crate) const REJECTED_TEXT: &str = "reject me";

#[derive(Clone, Default)]
struct Recorded {
    volume_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    webhook_texts: Arc<Mutex<Vec<String>>>,
}

/// Stand-in for both the volumes API and the incoming webhook.
pub(crate) struct FakeUpstream {
    base: String,
    recorded: Recorded,
}

impl FakeUpstream {
    pub(crate) fn volumes_url(&self) -> String {
        format!("{}/volumes", self.base)
    }

    pub(crate) fn webhook_url(&self) -> String {
        format!("{}/webhook", self.base)
    }

    pub(crate) fn state(&self) -> AppState {
        AppState {
            volumes: VolumesClient::new(self.volumes_url()),
            slack: SlackRelay::new(Some(self.webhook_url())),
        }
    }

    pub(crate) async fn volume_queries(&self) -> Vec<HashMap<String, String>> {
        self.recorded.volume_queries.lock().await.clone()
    }

    pub(crate) async fn webhook_texts(&self) -> Vec<String> {
        self.recorded.webhook_texts.lock().await.clone()
    }
}

async fn volumes(
    State(recorded): State<Recorded>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    recorded.volume_queries.lock().await.push(params.clone());
    if params.get("q").map(String::as_str) == Some(FAILING_QUERY) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let start: u64 = params
        .get("startIndex")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let end = (start + 10).min(TOTAL_ITEMS);
    let items: Vec<Value> = (start..end)
        .map(|index| {
            json!({
                "volumeInfo": {
                    "title": format!("Volume {index}"),
                    "authors": ["Octavia E. Butler"],
                    "publishedDate": format!("{}", 1970 + index),
                }
            })
        })
        .collect();
    Ok(Json(json!({ "totalItems": TOTAL_ITEMS, "items": items })))
}

async fn webhook(State(recorded): State<Recorded>, Json(body): Json<Value>) -> StatusCode {
    let text = body["text"].as_str().unwrap_or_default().to_string();
    if text == REJECTED_TEXT {
        return StatusCode::BAD_REQUEST;
    }
    recorded.webhook_texts.lock().await.push(text);
    StatusCode::OK
}

pub(crate) async fn spawn_fake_upstream() -> FakeUpstream {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/volumes", get(volumes))
        .route("/webhook", post(webhook))
        .with_state(recorded.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    FakeUpstream {
        base: format!("http://{addr}"),
        recorded,
    }
}
