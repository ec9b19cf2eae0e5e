use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use tripdesk_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};

/// Installs the global subscriber. A config that fails to load falls back to
/// defaults here; the command itself reports the config error.
pub fn init(options: &LoadOptions) {
    let logging = AppConfig::load(options.clone())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    install(&logging, std::env::var("RUST_LOG").ok().as_deref());
}

/// `RUST_LOG` directives win; otherwise the configured level applies to
/// every target.
fn env_filter(logging: &LoggingConfig, directives: Option<&str>) -> EnvFilter {
    let configured = logging.level.parse::<Level>().unwrap_or(Level::INFO);
    directives
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(LevelFilter::from_level(configured).into()))
}

fn install(logging: &LoggingConfig, directives: Option<&str>) {
    // Command output owns stdout, so logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(env_filter(logging, directives))
        .with_writer(std::io::stderr);

    let installed = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!(event_name = "cli.logging.already_installed", "subscriber already set");
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;
    use tripdesk_core::config::{LogFormat, LoggingConfig};

    use super::{env_filter, install};

    fn logging(level: &str) -> LoggingConfig {
        LoggingConfig { level: level.to_string(), format: LogFormat::Compact }
    }

    #[test]
    fn rust_log_overrides_the_configured_level() {
        let filter = env_filter(&logging("warn"), Some("tripdesk_core=debug"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn configured_level_applies_without_rust_log() {
        assert_eq!(env_filter(&logging("warn"), None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(env_filter(&logging("error"), Some("  ")).max_level_hint(), Some(LevelFilter::ERROR));
        assert_eq!(env_filter(&logging("bogus"), None).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn installing_twice_is_harmless() {
        install(&LoggingConfig { level: "warn".to_string(), format: LogFormat::Json }, None);
        install(&logging("bogus"), Some("debug"));
    }
}
