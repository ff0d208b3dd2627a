use anyhow::anyhow;
use ratify_core::config::{LogFormat, LoggingConfig};
use tracing::Level;

/// Installs the global subscriber. Output goes to stderr so stdout carries
/// only the command payload.
pub fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let level = logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
}

#[cfg(test)]
mod tests {
    use ratify_core::config::{LogFormat, LoggingConfig};

    use super::init_logging;

    #[test]
    fn second_install_reports_error_instead_of_panicking() {
        let logging = LoggingConfig { level: "not-a-level".to_string(), format: LogFormat::Json };

        let first = init_logging(&logging);
        let second = init_logging(&logging);

        assert!(first.is_ok());
        assert!(second.is_err());
    }
}
