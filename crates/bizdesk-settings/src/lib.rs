//! BizDesk Settings Crate
//!
//! Handles application configuration: the event bus tuning section and the
//! logging section, persisted as JSON or TOML.

pub mod config;
pub mod error;

pub use config::{Config, LogFormat, LoggingSettings};
pub use error::{SettingsError, SettingsResult};
