//! # BizDesk
//!
//! Business management desktop suite. The modules (customers, suppliers,
//! finance, contracts, reports) talk to each other only through the
//! in-process event bus.
//!
//! ## Architecture
//!
//! BizDesk is organized as a workspace with multiple crates:
//!
//! 1. **bizdesk-core** - Error types and the event bus
//! 2. **bizdesk-settings** - Configuration files for the bus and logging
//! 3. **bizdesk** - Main binary that wires modules onto the bus
//!
//! ## Features
//!
//! - **Decoupled Modules**: publishers never know their subscribers
//! - **Prioritized Delivery**: critical events jump the queue
//! - **Background Work**: slow subscribers run on a worker pool
//! - **Diagnostics**: event history, per-type statistics, notifications

pub mod host;

pub use bizdesk_core::{
    event_bus, BusNotification, Event, EventBus, EventBusConfig, EventFilter, NewEvent, Priority,
    ProcessingStats, SubscribeOptions, SubscriptionId,
};
pub use bizdesk_settings::{Config, LogFormat, LoggingSettings, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging from the logging settings
///
/// Sets up structured logging with:
/// - Console output, pretty or JSON per settings
/// - RUST_LOG environment variable support, overriding the configured level
/// - Thread names, so dispatch and worker output can be told apart
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))?;

    let (pretty_layer, json_layer) = match settings.format {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .with_writer(std::io::stdout)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_names(settings.thread_names)
                    .with_line_number(true)
                    .pretty(),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .with_writer(std::io::stdout)
                    .with_thread_names(settings.thread_names)
                    .json(),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty_layer)
        .with(json_layer)
        .try_init()?;

    Ok(())
}
