use std::{collections::HashMap, fs, path::Path, path::PathBuf};

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub search_base_url: String,
    pub user_key: String,
    pub flags_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            search_base_url: "http://127.0.0.1:5000".into(),
            user_key: "user1".into(),
            flags_file: None,
        }
    }
}

/// Defaults, then `config_path` if it parses, then `APP__*` variables.
pub fn load_settings_from(
    config_path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("search_base_url") {
                    settings.search_base_url = v.clone();
                }
                if let Some(v) = file_cfg.get("user_key") {
                    settings.user_key = v.clone();
                }
                if let Some(v) = file_cfg.get("flags_file") {
                    settings.flags_file = Some(PathBuf::from(v));
                }
            }
            Err(err) => {
                warn!(path = %config_path.display(), %err, "config: ignoring unparseable file");
            }
        }
    }

    if let Some(v) = env("APP__SEARCH_BASE_URL") {
        settings.search_base_url = v;
    }
    if let Some(v) = env("APP__USER_KEY") {
        settings.user_key = v;
    }
    if let Some(v) = env("APP__FLAGS_FILE") {
        settings.flags_file = Some(PathBuf::from(v));
    }

    settings
}
