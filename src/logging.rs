//! Logging setup
//!
//! Logs always go to stderr: in plugin mode stdout carries the handshake
//! line the host parses, so nothing else may be written there.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

use crate::domain::PLUGIN_NAME;

/// Environment variable consulted when `--log-level` is not given
pub const LOG_LEVEL_ENV: &str = "TI_SCAFFOLD_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Directive scoping the level to this crate; `RUST_LOG` takes precedence
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", PLUGIN_NAME.replace('-', "_"), self.as_str()))
        })
    }
}

/// Picks the flag value, else [`LOG_LEVEL_ENV`], else the default
pub fn resolve_level(
    flag: Option<LogLevel>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<LogLevel, String> {
    if let Some(level) = flag {
        return Ok(level);
    }

    match lookup(LOG_LEVEL_ENV).filter(|v| !v.is_empty()) {
        Some(value) => LogLevel::from_str(&value, true)
            .map_err(|_| format!("invalid value '{}' for {}", value, LOG_LEVEL_ENV)),
        None => Ok(LogLevel::default()),
    }
}

/// Installs the process-wide subscriber; called once from `main`
pub fn init(level: LogLevel) {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(level.filter())
        .with_target(false)
        .finish();

    // A subscriber may already be installed when embedded in a host process
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
