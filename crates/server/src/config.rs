use std::{collections::HashMap, fs, path::Path};

use tracing::warn;

pub const DEFAULT_BOOKS_API_URL: &str = "https://www.googleapis.com/books/v1/volumes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub books_api_url: String,
    pub slack_webhook_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:5000".into(),
            books_api_url: DEFAULT_BOOKS_API_URL.into(),
            slack_webhook_url: None,
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new("server.toml"), |key| std::env::var(key).ok())
}

/// Defaults, then `config_path` if it parses, then the environment. Later
/// names in each env list win.
pub fn load_settings_from(
    config_path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("bind_addr") {
                    settings.server_bind = v.clone();
                }
                if let Some(v) = file_cfg.get("books_api_url") {
                    settings.books_api_url = v.clone();
                }
                if let Some(v) = file_cfg.get("slack_webhook_url") {
                    settings.slack_webhook_url = Some(v.clone());
                }
            }
            Err(err) => {
                warn!(path = %config_path.display(), %err, "config: ignoring unparseable file");
            }
        }
    }

    for key in ["SERVER_BIND", "APP__BIND_ADDR"] {
        if let Some(v) = env(key) {
            settings.server_bind = v;
        }
    }
    for key in ["BOOKS_API_URL", "APP__BOOKS_API_URL"] {
        if let Some(v) = env(key) {
            settings.books_api_url = v;
        }
    }
    for key in ["SLACK_WEBHOOK_URL", "APP__SLACK_WEBHOOK_URL"] {
        if let Some(v) = env(key).filter(|v| !v.is_empty()) {
            settings.slack_webhook_url = Some(v);
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
