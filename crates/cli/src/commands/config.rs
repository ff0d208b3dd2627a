use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ratify_core::authorization::CapabilityGrant;
use ratify_core::config::{AppConfig, LoadOptions, LogFormat};
use serde::Serialize;
use toml::Value;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> super::CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return super::CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());
    let source = |key: &str, env_keys: &[&str]| {
        field_source(key, env_keys, file_doc.as_ref(), file_path.as_deref())
    };

    let entries = vec![
        ConfigEntry {
            key: "database.url",
            value: config.database.url.clone(),
            source: source("database.url", &["RATIFY_DATABASE_URL"]),
        },
        ConfigEntry {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            source: source("database.max_connections", &["RATIFY_DATABASE_MAX_CONNECTIONS"]),
        },
        ConfigEntry {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            source: source("database.timeout_secs", &["RATIFY_DATABASE_TIMEOUT_SECS"]),
        },
        ConfigEntry {
            key: "logging.level",
            value: config.logging.level.clone(),
            source: source("logging.level", &["RATIFY_LOGGING_LEVEL", "RATIFY_LOG_LEVEL"]),
        },
        ConfigEntry {
            key: "logging.format",
            value: render_format(config.logging.format).to_string(),
            source: source("logging.format", &["RATIFY_LOGGING_FORMAT", "RATIFY_LOG_FORMAT"]),
        },
        ConfigEntry {
            key: "authorization.grants",
            value: render_grants(&config.authorization.grants),
            source: source("authorization.grants", &["RATIFY_AUTHORIZATION_GRANTS"]),
        },
    ];

    super::CommandResult::success_with_data(
        "config",
        "effective config (source precedence: env > file > default)",
        serde_json::json!({ "entries": entries }),
    )
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("ratify.toml"), PathBuf::from("config/ratify.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
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

fn render_format(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    }
}

/// Same `actor:subject_type:cap|cap;...` syntax the env override accepts.
fn render_grants(grants: &[CapabilityGrant]) -> String {
    if grants.is_empty() {
        return "<none>".to_string();
    }

    grants
        .iter()
        .map(|grant| {
            let capabilities: Vec<&str> =
                grant.capabilities.iter().map(|capability| capability.as_str()).collect();
            format!("{}:{}:{}", grant.actor, grant.subject_type, capabilities.join("|"))
        })
        .collect::<Vec<_>>()
        .join(";")
}
