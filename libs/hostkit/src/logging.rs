//! Logging initialization for host processes.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging section of the host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `docstore=debug,info`.
    pub level: String,
    pub format: LogFormat,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Pick the filter directive: CLI verbosity beats the configured level.
    #[must_use]
    pub fn directive(&self, verbosity: u8) -> &str {
        match verbosity {
            0 => &self.level,
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over both `verbosity` and the configured level.
/// Only the first call has an effect.
pub fn init_logging(cfg: &LoggingConfig, verbosity: u8) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(cfg.directive(verbosity)));

        let registry = tracing_subscriber::registry().with(filter);
        let result = match cfg.format {
            LogFormat::Text => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(cfg.ansi)
                        .with_target(true),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().with_target(true))
                .try_init(),
        };

        if let Err(e) = result {
            // Another subscriber was installed first (e.g. by a test harness).
            tracing::debug!(error = %e, "global subscriber already set");
        }
    });
}
