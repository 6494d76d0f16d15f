//! # Structured Logging
//!
//! Span macros and subscriber setup for the bootstrap run. Every
//! reconciliation runs inside a `reconcile` span carrying the resource kind
//! and natural key, so progress lines can be filtered per resource.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::errors::{BootstrapError, Result};

/// Create a tracing span for one reconciliation.
///
/// ```rust,ignore
/// let span = reconcile_span!(ResourceKind::Realm, "todo");
/// ```
#[macro_export]
macro_rules! reconcile_span {
    ($kind:expr, $key:expr) => {
        tracing::info_span!("reconcile", kind = %$kind, key = %$key)
    };
    ($kind:expr, $key:expr, $($field:tt)*) => {
        tracing::info_span!("reconcile", kind = %$kind, key = %$key, $($field)*)
    };
}

/// Create a tracing span for one provisioning pipeline
#[macro_export]
macro_rules! pipeline_span {
    ($pipeline:expr) => {
        tracing::info_span!("pipeline", name = %$pipeline)
    };
    ($pipeline:expr, $($field:tt)*) => {
        tracing::info_span!("pipeline", name = %$pipeline, $($field)*)
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Installing twice (tests,
/// embedding) is not an error.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = resolve_filter(from_env.as_deref(), &config.level)?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if installed.is_err() {
        // Subscriber already set elsewhere; keep it.
        tracing::debug!("Global tracing subscriber already installed");
    }

    Ok(())
}

/// Valid `RUST_LOG` directives win; otherwise the configured level applies
fn resolve_filter(from_env: Option<&str>, level: &str) -> Result<EnvFilter> {
    if let Some(filter) = from_env.filter(|d| !d.trim().is_empty()).and_then(|d| EnvFilter::try_new(d).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| BootstrapError::config(format!("Invalid log level '{}': {}", level, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = reconcile_span!("realm", "todo");
        let _span = reconcile_span!("client", "todo-ui", scope = "todo");
        let _span = pipeline_span!("identity");
        let _span = pipeline_span!("secrets", url = "http://localhost:8200");
    }

    #[test]
    fn test_configured_level_applies_without_env() {
        let filter = resolve_filter(None, "debug").unwrap();
        assert_eq!(filter.to_string(), "debug");

        let filter = resolve_filter(Some("  "), "info").unwrap();
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_env_directives_win() {
        let filter = resolve_filter(Some("warn"), "debug").unwrap();
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        let error = resolve_filter(None, "stack_bootstrap=loud").unwrap_err();
        assert!(matches!(error, BootstrapError::Config { .. }));
    }
}
