pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tripdesk_core::config::LoadOptions;

use crate::commands::actions::ActionsQuery;

#[derive(Debug, Parser)]
#[command(
    name = "tripdesk",
    about = "Tripdesk operator CLI",
    long_about = "Operate the Tripdesk travel request workflow: migrations, demo data, config inspection, readiness checks, and permission lookups.",
    after_help = "Examples:\n  tripdesk doctor --json\n  tripdesk seed\n  tripdesk actions --email director@mhfa.com.au --password demo123 --request REQ-2026-001"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this file instead of tripdesk.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo users, requests, documents and invoices (idempotent)")]
    Seed,
    #[command(about = "Run end-to-end readiness checks with per-check timing details")]
    Smoke,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity, and migration status")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Sign in as a user and list the actions they may take on a request")]
    Actions {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long = "request")]
        request_id: String,
    },
}

impl Cli {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            ..LoadOptions::default()
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();
    logging::init(&options);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Smoke => commands::smoke::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, json),
        Command::Actions { email, password, request_id } => commands::actions::run(
            &options,
            ActionsQuery { email, password: SecretString::from(password), request_id },
        ),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
