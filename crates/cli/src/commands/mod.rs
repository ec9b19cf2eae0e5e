pub mod actions;
pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;
pub mod smoke;

use serde::Serialize;
use tokio::runtime::Runtime;
use tripdesk_core::config::{AppConfig, LoadOptions};
use tripdesk_core::errors::{ApplicationError, InterfaceError};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Plain text output that always exits cleanly.
    pub fn report(output: String) -> Self {
        Self { exit_code: 0, output }
    }
}

/// A failed step inside a command: error class, message, exit code.
pub(crate) type StepFailure = (&'static str, String, u8);

/// Maps an application error onto the CLI contract through the interface
/// layer: the user-safe message plus the correlation id to grep logs for.
pub(crate) fn application_failure(
    error: impl Into<ApplicationError>,
    correlation_id: Option<&str>,
) -> StepFailure {
    let interface = match correlation_id {
        Some(id) => error.into().into_interface(id),
        None => InterfaceError::from(error.into()),
    };
    let (error_class, exit_code) = match &interface {
        InterfaceError::Forbidden { .. } => ("authorization", 7),
        InterfaceError::NotFound { .. } => ("not_found", 8),
        InterfaceError::BadRequest { .. } | InterfaceError::Conflict { .. } => {
            ("invalid_request", 9)
        }
        InterfaceError::ServiceUnavailable { .. } => ("db_unavailable", 4),
    };
    let message = format!(
        "{} ({interface}) [correlation_id={}]",
        interface.user_message(),
        interface.correlation_id()
    );
    (error_class, message, exit_code)
}

pub(crate) fn load_config(command: &str, options: &LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    })
}

pub(crate) fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
