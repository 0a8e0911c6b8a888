use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use assetflow_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use toml::Value;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let entries = effective_entries(&config, detect_config_path().as_deref());
    let lines = entries.iter().map(render_line).collect::<Vec<_>>();
    CommandResult::success_with_data(
        "config",
        format!("effective config (source precedence: env > file > default):\n{}", lines.join("\n")),
        serde_json::to_value(&entries).ok(),
    )
}

fn effective_entries(config: &AppConfig, config_file_path: Option<&Path>) -> Vec<ConfigEntry> {
    let doc = load_config_file_doc(config_file_path);
    let entry = |key: &'static str, value: String, env_keys: &[&str]| ConfigEntry {
        key,
        value,
        source: field_source(key, env_keys, doc.as_ref(), config_file_path),
    };

    vec![
        entry("store.url", config.store.url.clone(), &["ASSETFLOW_STORE_URL"]),
        entry(
            "store.max_connections",
            config.store.max_connections.to_string(),
            &["ASSETFLOW_STORE_MAX_CONNECTIONS"],
        ),
        entry(
            "store.timeout_secs",
            config.store.timeout_secs.to_string(),
            &["ASSETFLOW_STORE_TIMEOUT_SECS"],
        ),
        entry("store.collection", config.store.collection.clone(), &["ASSETFLOW_STORE_COLLECTION"]),
        entry(
            "lifecycle.optimistic_concurrency",
            config.lifecycle.optimistic_concurrency.to_string(),
            &["ASSETFLOW_LIFECYCLE_OPTIMISTIC_CONCURRENCY"],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["ASSETFLOW_LOGGING_LEVEL", "ASSETFLOW_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["ASSETFLOW_LOGGING_FORMAT", "ASSETFLOW_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["assetflow.toml", "config/assetflow.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(entry: &ConfigEntry) -> String {
    format!("- {} = {} (source: {})", entry.key, entry.value, entry.source)
}
