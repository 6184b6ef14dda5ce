//! # Configuration
//!
//! Client-side settings shared by the library and the `gavel` binary.

pub mod client;

pub use client::{Config, ConfigError, LogFormat, LoggingConfig, join};
