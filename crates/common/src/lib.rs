pub mod config;
pub mod logging;

pub use config::{Environment, LogLevel};
pub use logging::{setup_logging, try_setup_logging};

/// Creates an info-level span and enters it.
#[macro_export]
macro_rules! span {
    ($name:literal) => {
        tracing::info_span!($name).entered()
    };
}
