//! Log output for the daemon
//!
//! `LEDCTL_LOG` takes a tracing filter (e.g. `ledctl=debug,info`) and wins
//! over the mode chosen on the command line.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "LEDCTL_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    Normal,
    Verbose,
}

impl LoggingMode {
    fn default_filter(self) -> &'static str {
        match self {
            LoggingMode::Normal => "info",
            LoggingMode::Verbose => "debug",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("can't initialize tracing subscriber: {0}")]
    TracingInit(String),
    #[error("invalid LEDCTL_LOG filter: {0}")]
    InvalidEnv(String),
}

fn filter(mode: LoggingMode, env: Option<&str>) -> Result<EnvFilter, LoggingError> {
    match env {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|e| LoggingError::InvalidEnv(e.to_string()))
        }
        None => Ok(EnvFilter::new(mode.default_filter())),
    }
}

pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    let env = std::env::var(LOG_ENV).ok();
    let filter = filter(mode, env.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(mode == LoggingMode::Verbose)
        .compact()
        .try_init()
        .map_err(|e| LoggingError::TracingInit(e.to_string()))
}
