use serde::Serialize;
use tripdesk_core::config::{AppConfig, LoadOptions};
use tripdesk_db::{connect_with_config, migrations};

use crate::commands::{escape_json, runtime, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }

    fn skipped(name: &'static str, cause: &str) -> Self {
        Self::new(name, CheckStatus::Skipped, format!("skipped because {cause}"))
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Read-only readiness report. Never creates tables or applies migrations.
pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_default_vendor(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["default_vendor", "database_connectivity", "migration_status"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    DoctorReport {
        overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
        summary: if all_pass {
            "doctor: all readiness checks passed".to_string()
        } else {
            "doctor: one or more readiness checks failed".to_string()
        },
        checks,
    }
}

fn check_default_vendor(config: &AppConfig) -> DoctorCheck {
    let details = match &config.workflow.default_vendor_id {
        Some(vendor_id) => format!("start_quoting falls back to `{vendor_id}`"),
        None => "no default vendor; start_quoting must name one".to_string(),
    };
    DoctorCheck::new("default_vendor", CheckStatus::Pass, details)
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match runtime("doctor") {
        Ok(runtime) => runtime,
        Err(_) => {
            return vec![
                DoctorCheck::new(
                    "database_connectivity",
                    CheckStatus::Fail,
                    "failed to initialize async runtime",
                ),
                DoctorCheck::skipped("migration_status", "the database was unreachable"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::new(
                        "database_connectivity",
                        CheckStatus::Fail,
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("migration_status", "the database was unreachable"),
                ];
            }
        };

        let connectivity = DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Pass,
            format!("connected using `{}`", config.database.url),
        );
        let bundled = migrations::bundled_count();
        let migration_status = match migrations::applied_count(&pool).await {
            Ok(applied) if applied >= bundled => DoctorCheck::new(
                "migration_status",
                CheckStatus::Pass,
                format!("{applied} of {bundled} migrations applied"),
            ),
            Ok(applied) => DoctorCheck::new(
                "migration_status",
                CheckStatus::Fail,
                format!("{applied} of {bundled} migrations applied; run `tripdesk migrate`"),
            ),
            Err(error) => DoctorCheck::new(
                "migration_status",
                CheckStatus::Fail,
                format!("could not read migration history: {error}"),
            ),
        };

        pool.close().await;
        vec![connectivity, migration_status]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
