use std::sync::Arc;

use tripdesk_core::config::LoadOptions;
use tripdesk_core::notify::NoopNotifier;
use tripdesk_db::fixtures::{ADMIN_PASSWORD, DEMO_PASSWORD, SEED_INVOICE_IDS, SEED_REQUEST_IDS};
use tripdesk_db::{connect_with_config, migrations, seed_demo, sqlite_ports, verify_demo, SeedResult};

use crate::commands::{load_config, runtime, CommandResult, StepFailure};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let outcome: Result<SeedResult, StepFailure> = async {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;

            let ports = sqlite_ports(&pool, Arc::new(NoopNotifier));
            let created = seed_demo(&ports)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
            let verification = verify_demo(&ports)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

            if verification.passed {
                Ok(created)
            } else {
                let failed = verification.failures().map(|check| check.name.as_str()).collect();
                Err(("seed_verification", verification_message(failed), 6u8))
            }
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok(created) => CommandResult::success("seed", summary(&created)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(created: &SeedResult) -> String {
    format!(
        "demo dataset ready ({} records created)\n  requests: {}\n  invoices: {}\n  password: {DEMO_PASSWORD} (admin: {ADMIN_PASSWORD})",
        created.total(),
        SEED_REQUEST_IDS.join(", "),
        SEED_INVOICE_IDS.join(", "),
    )
}

fn verification_message(failed: Vec<&str>) -> String {
    if failed.is_empty() {
        "demo dataset failed verification".to_string()
    } else {
        format!("demo dataset failed verification for: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::{summary, verification_message};
    use tripdesk_db::SeedResult;

    #[test]
    fn verification_message_names_failed_checks() {
        assert_eq!(
            verification_message(vec!["request REQ-2026-003", "invoice INV-2025-001"]),
            "demo dataset failed verification for: request REQ-2026-003, invoice INV-2025-001"
        );
    }

    #[test]
    fn verification_message_falls_back_without_names() {
        assert_eq!(verification_message(Vec::new()), "demo dataset failed verification");
    }

    #[test]
    fn summary_lists_seeded_ids_and_count() {
        let created = SeedResult {
            users_created: 6,
            requests_created: 5,
            documents_created: 3,
            invoices_created: 3,
        };
        let text = summary(&created);
        assert!(text.starts_with("demo dataset ready (17 records created)"));
        assert!(text.contains("REQ-2026-001, REQ-2026-002"));
        assert!(text.contains("INV-2025-001"));
    }
}
