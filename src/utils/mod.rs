//! Configuration utilities

pub mod config;

pub use config::{ChangeDetectionConfig, ConfigurationManager, LogLevel, SystemConfig};
