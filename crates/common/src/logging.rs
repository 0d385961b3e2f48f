use crate::config::{Environment, LogLevel};
use std::io::IsTerminal;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError,
};

/// Install the global subscriber: JSON in production, pretty output otherwise.
///
/// `RUST_LOG` takes precedence over `log_level`. Everything is written to
/// stderr; stdout carries detection output.
///
/// An OpenTelemetry layer is always attached. It exports spans only when a
/// global tracer provider has been installed by the embedding application.
pub fn try_setup_logging(log_level: LogLevel, environment: Environment) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));

    let fmt_layer = match environment {
        Environment::Production => fmt::layer()
            .json()
            .with_level(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
        Environment::Development => fmt::layer()
            .pretty()
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_opentelemetry::layer())
        .with(fmt_layer)
        .try_init()
}

/// Like [`try_setup_logging`], but a second initialization only warns.
pub fn setup_logging(log_level: LogLevel, environment: Environment) {
    if let Err(e) = try_setup_logging(log_level, environment) {
        tracing::warn!(error = %e, "Logging was already initialized");
    }
}
