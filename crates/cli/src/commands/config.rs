use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hivebot_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let path = detect_config_path();
            let doc = load_config_file_doc(path.as_deref());
            render(&config, &ConfigSources { path: path.as_deref(), doc: doc.as_ref() })
        }
        Err(error) => format!("config validation failed: {error}"),
    }
}

/// Where a value may have come from, besides the environment.
pub struct ConfigSources<'a> {
    pub path: Option<&'a Path>,
    pub doc: Option<&'a Value>,
}

pub fn render(config: &AppConfig, sources: &ConfigSources<'_>) -> String {
    let enabled_plugins = match &config.plugins.enabled {
        Some(ids) => ids.join(","),
        None => "<all builtin>".to_string(),
    };
    let app_token = match &config.slack.app_token {
        Some(token) => redact_token(token),
        None => "<unset>".to_string(),
    };

    let fields: Vec<(&str, &str, String)> = vec![
        ("database.url", "HIVEBOT_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "HIVEBOT_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "HIVEBOT_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ("slack.bot_token", "HIVEBOT_SLACK_BOT_TOKEN", redact_token(&config.slack.bot_token)),
        ("slack.signing_secret", "HIVEBOT_SLACK_SIGNING_SECRET", "<redacted>".to_string()),
        ("slack.app_token", "HIVEBOT_SLACK_APP_TOKEN", app_token),
        ("slack.api_base_url", "HIVEBOT_SLACK_API_BASE_URL", config.slack.api_base_url.clone()),
        ("server.bind_address", "HIVEBOT_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        ("server.port", "HIVEBOT_SERVER_PORT", config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            "HIVEBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        (
            "dispatch.command_timeout_ms",
            "HIVEBOT_DISPATCH_COMMAND_TIMEOUT_MS",
            config.dispatch.command_timeout_ms.to_string(),
        ),
        (
            "dispatch.webhook_timeout_ms",
            "HIVEBOT_DISPATCH_WEBHOOK_TIMEOUT_MS",
            config.dispatch.webhook_timeout_ms.to_string(),
        ),
        (
            "dispatch.handler_buffer",
            "HIVEBOT_DISPATCH_HANDLER_BUFFER",
            config.dispatch.handler_buffer.to_string(),
        ),
        (
            "dispatch.signature_max_age_secs",
            "HIVEBOT_DISPATCH_SIGNATURE_MAX_AGE_SECS",
            config.dispatch.signature_max_age_secs.to_string(),
        ),
        ("plugins.enabled", "HIVEBOT_PLUGINS_ENABLED", enabled_plugins),
        ("logging.level", "HIVEBOT_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "HIVEBOT_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_key, value) in fields {
        lines.push(format!("- {key} = {value} (source: {})", field_source(key, env_key, sources)));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("hivebot.toml"), PathBuf::from("config/hivebot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(key_path: &str, env_key: &str, sources: &ConfigSources<'_>) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if sources.doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = sources
            .path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
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

fn redact_token(token: &SecretString) -> String {
    let trimmed = token.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
