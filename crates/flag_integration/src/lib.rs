use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, RwLock,
    },
};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagEvent {
    Ready,
    Changed { keys: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEvent {
    pub key: String,
    pub payload: serde_json::Value,
}

/// Contract of a remote feature-flag service as seen by one browser user.
#[async_trait]
pub trait FlagClient: Send + Sync {
    fn is_ready(&self) -> bool;
    /// Boolean variation for `key`; `default` until the client is ready or
    /// when the flag is unknown.
    fn variation(&self, key: &str, default: bool) -> bool;
    async fn track(&self, key: &str, payload: serde_json::Value) -> anyhow::Result<()>;
    fn subscribe_events(&self) -> broadcast::Receiver<FlagEvent>;
}

pub struct MissingFlagClient;

#[async_trait]
impl FlagClient for MissingFlagClient {
    fn is_ready(&self) -> bool {
        false
    }

    fn variation(&self, _key: &str, default: bool) -> bool {
        default
    }

    async fn track(&self, key: &str, _payload: serde_json::Value) -> anyhow::Result<()> {
        Err(anyhow!("flag service is unavailable; dropped event {key}"))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<FlagEvent> {
        let (_, events) = broadcast::channel(1);
        events
    }
}

#[derive(Debug, Default, Deserialize)]
struct FlagFile {
    #[serde(default)]
    flags: HashMap<String, bool>,
}

/// In-process flag service: holds flag values in memory, announces readiness
/// and changes on a broadcast stream and records tracked events.
pub struct LocalFlagClient {
    user_key: String,
    flags: RwLock<HashMap<String, bool>>,
    ready: AtomicBool,
    tracked: Mutex<Vec<TrackedEvent>>,
    events: broadcast::Sender<FlagEvent>,
}

impl LocalFlagClient {
    pub fn new(user_key: impl Into<String>) -> Self {
        Self::with_flags(user_key, HashMap::new())
    }

    pub fn with_flags(user_key: impl Into<String>, flags: HashMap<String, bool>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            user_key: user_key.into(),
            flags: RwLock::new(flags),
            ready: AtomicBool::new(false),
            tracked: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Loads a `[flags]` table of booleans from a TOML file.
    pub fn from_file(user_key: impl Into<String>, path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read flag file '{}'", path.display()))?;
        let file: FlagFile = toml::from_str(&raw)
            .with_context(|| format!("invalid flag file '{}'", path.display()))?;
        Ok(Self::with_flags(user_key, file.flags))
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    pub fn mark_ready(&self) {
        if self.ready.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(user_key = %self.user_key, "flags: client ready");
        let _ = self.events.send(FlagEvent::Ready);
    }

    /// Updates one flag. A change notification is published only when the
    /// client is ready and the stored value actually changed.
    pub fn set_flag(&self, key: &str, value: bool) {
        let previous = {
            let mut flags = self
                .flags
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            flags.insert(key.to_string(), value)
        };
        if previous == Some(value) || !self.is_ready() {
            return;
        }
        info!(flag = key, value, "flags: flag changed");
        let _ = self.events.send(FlagEvent::Changed {
            keys: vec![key.to_string()],
        });
    }

    pub fn tracked_events(&self) -> Vec<TrackedEvent> {
        self.tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl FlagClient for LocalFlagClient {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn variation(&self, key: &str, default: bool) -> bool {
        if !self.is_ready() {
            return default;
        }
        self.flags
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
            .unwrap_or(default)
    }

    async fn track(&self, key: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        if !self.is_ready() {
            warn!(event = key, "flags: tracking event before client readiness");
        }
        info!(event = key, user_key = %self.user_key, %payload, "flags: tracked event");
        self.tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(TrackedEvent {
                key: key.to_string(),
                payload,
            });
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<FlagEvent> {
        self.events.subscribe()
    }
}
