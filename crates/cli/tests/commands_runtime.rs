use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use secrecy::SecretString;
use serde_json::Value;
use tempfile::TempDir;
use tripdesk_cli::commands::actions::ActionsQuery;
use tripdesk_cli::commands::{actions, config, doctor, migrate, seed, smoke};
use tripdesk_core::config::{ConfigOverrides, LoadOptions};

#[test]
fn migrate_applies_bundled_migrations() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let result = migrate::run(&options_for(dir.path()));
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "schema up to date: 1 of 1 migrations applied");
    });
}

#[test]
fn migrate_reports_config_failure() {
    with_env(&[("TRIPDESK_LOGGING_LEVEL", "verbose")], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn missing_explicit_config_file_is_a_config_failure() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let options = LoadOptions {
            config_path: Some(dir.path().join("absent.toml")),
            require_file: true,
            ..LoadOptions::default()
        };
        let result = seed::run(&options);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_demo_dataset_once() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let options = options_for(dir.path());

        let first = seed::run(&options);
        assert_eq!(first.exit_code, 0, "expected first seed success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");
        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("demo dataset ready (17 records created)"));
        assert!(message.contains("REQ-2026-001, REQ-2026-002, REQ-2026-003"));
        assert!(message.contains("INV-2026-001, INV-2026-002, INV-2025-001"));

        let second = seed::run(&options);
        assert_eq!(second.exit_code, 0, "expected second seed success: {}", second.output);
        let second_payload = parse_payload(&second.output);
        let second_message = second_payload["message"].as_str().unwrap_or_default();
        assert!(second_message.starts_with("demo dataset ready (0 records created)"));
    });
}

#[test]
fn actions_lists_approver_options_for_pending_request() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let options = options_for(dir.path());
        assert_eq!(seed::run(&options).exit_code, 0);

        let result = actions::run(&options, query("director@mhfa.com.au", "demo123", "REQ-2026-001"));
        assert_eq!(result.exit_code, 0, "expected actions success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "actions");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("REQ-2026-001 "));
        assert!(message.contains("as David [Approver]"));
        assert!(message.ends_with(": approve, reject, add_note, upload_document"));
    });
}

#[test]
fn actions_rejects_bad_credentials_and_foreign_requests() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let options = options_for(dir.path());
        assert_eq!(seed::run(&options).exit_code, 0);

        let wrong_password =
            actions::run(&options, query("director@mhfa.com.au", "nope", "REQ-2026-001"));
        assert_eq!(wrong_password.exit_code, 7);
        let payload = parse_payload(&wrong_password.output);
        assert_eq!(payload["error_class"], "authentication");
        assert_eq!(payload["message"], "Invalid password");

        let foreign = actions::run(&options, query("sarah@mhfa.com.au", "demo123", "REQ-2026-003"));
        assert_eq!(foreign.exit_code, 7, "employee should not see another requester's trip");
        let foreign_payload = parse_payload(&foreign.output);
        assert_eq!(foreign_payload["error_class"], "authorization");
        let foreign_message = foreign_payload["message"].as_str().unwrap_or_default();
        assert!(foreign_message.starts_with("You do not have permission to perform this action."));
        assert!(foreign_message.contains("[correlation_id="));
        assert!(!foreign_message.contains("[correlation_id=unassigned]"));

        let missing = actions::run(&options, query("glenda@mhfa.com.au", "demo123", "REQ-2026-999"));
        assert_eq!(missing.exit_code, 8);
        assert_eq!(parse_payload(&missing.output)["error_class"], "not_found");
    });
}

#[test]
fn config_reports_sources() {
    with_env(&[("TRIPDESK_WORKFLOW_DEFAULT_VENDOR_ID", "USR-005")], || {
        let result = config::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0);
        assert!(result.output.starts_with("effective config"));
        assert!(result.output.contains(
            "- workflow.default_vendor_id = USR-005 (source: env (TRIPDESK_WORKFLOW_DEFAULT_VENDOR_ID))"
        ));
        assert!(result.output.contains("- logging.format = compact (source: default)"));
    });
}

#[test]
fn doctor_flags_pending_migrations_until_migrate_runs() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let options = options_for(dir.path());

        let before = doctor::run(&options, true);
        assert_eq!(before.exit_code, 1);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check_status(&report, "database_connectivity"), "pass");
        assert_eq!(check_status(&report, "migration_status"), "fail");

        assert_eq!(migrate::run(&options).exit_code, 0);

        let after = doctor::run(&options, true);
        assert_eq!(after.exit_code, 0, "expected healthy report: {}", after.output);
        let report = parse_payload(&after.output);
        assert_eq!(report["overall_status"], "pass");
        assert_eq!(check_status(&report, "migration_status"), "pass");
    });
}

#[test]
fn doctor_human_output_lists_every_check() {
    with_env(&[("TRIPDESK_LOGGING_LEVEL", "verbose")], || {
        let result = doctor::run(&LoadOptions::default(), false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] migration_status:"));
    });
}

#[test]
fn smoke_returns_success_report() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let result = smoke::run(&options_for(dir.path()));
        assert_eq!(result.exit_code, 0, "expected successful smoke report: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");
        assert_eq!(payload["checks"].as_array().map(Vec::len), Some(4));
        assert_eq!(check_status(&payload, "workflow_rules"), "pass");
    });
}

#[test]
fn smoke_skips_remaining_checks_when_config_invalid() {
    with_env(&[("TRIPDESK_DATABASE_MAX_CONNECTIONS", "many")], || {
        let result = smoke::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
        assert_eq!(check_status(&payload, "config_validation"), "fail");
        assert_eq!(check_status(&payload, "workflow_rules"), "skipped");
    });
}

fn options_for(dir: &Path) -> LoadOptions {
    let database_url = format!("sqlite://{}", dir.join("tripdesk.db").display());
    LoadOptions {
        overrides: ConfigOverrides { database_url: Some(database_url), ..ConfigOverrides::default() },
        ..LoadOptions::default()
    }
}

fn query(email: &str, password: &str, request_id: &str) -> ActionsQuery {
    ActionsQuery {
        email: email.to_string(),
        password: SecretString::from(password.to_string()),
        request_id: request_id.to_string(),
    }
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "TRIPDESK_DATABASE_URL",
        "TRIPDESK_DATABASE_MAX_CONNECTIONS",
        "TRIPDESK_DATABASE_TIMEOUT_SECS",
        "TRIPDESK_WORKFLOW_DEFAULT_VENDOR_ID",
        "TRIPDESK_WORKFLOW_INVOICE_PAYMENT_TERMS_DAYS",
        "TRIPDESK_WORKFLOW_NOTIFICATIONS_ENABLED",
        "TRIPDESK_LOGGING_LEVEL",
        "TRIPDESK_LOGGING_FORMAT",
        "TRIPDESK_LOG_LEVEL",
        "TRIPDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
