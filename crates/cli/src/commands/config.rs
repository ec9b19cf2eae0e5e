use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use tripdesk_core::config::{AppConfig, LoadOptions};

use crate::commands::{load_config, CommandResult};

/// One effective setting and the environment variable that can override it.
struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    CommandResult::report(lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let field =
        |key: &'static str, env_key: &'static str, value: String| Field { key, env_key, value };
    vec![
        field("database.url", "TRIPDESK_DATABASE_URL", redact_url(&config.database.url)),
        field(
            "database.max_connections",
            "TRIPDESK_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            "TRIPDESK_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        field(
            "workflow.default_vendor_id",
            "TRIPDESK_WORKFLOW_DEFAULT_VENDOR_ID",
            config.workflow.default_vendor_id.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        field(
            "workflow.invoice_payment_terms_days",
            "TRIPDESK_WORKFLOW_INVOICE_PAYMENT_TERMS_DAYS",
            config.workflow.invoice_payment_terms_days.to_string(),
        ),
        field(
            "workflow.notifications_enabled",
            "TRIPDESK_WORKFLOW_NOTIFICATIONS_ENABLED",
            config.workflow.notifications_enabled.to_string(),
        ),
        field("logging.level", "TRIPDESK_LOGGING_LEVEL", config.logging.level.clone()),
        field(
            "logging.format",
            "TRIPDESK_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("tripdesk.toml"), PathBuf::from("config/tripdesk.toml")]
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
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

/// Hides any credentials embedded in a connection URL.
fn redact_url(url: &str) -> String {
    match (url.split_once("://"), url.rfind('@')) {
        (Some((scheme, _)), Some(at)) => format!("{scheme}://***{}", &url[at..]),
        _ => url.to_string(),
    }
}
