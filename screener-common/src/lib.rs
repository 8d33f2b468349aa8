//! Screener Common - Shared configuration, errors and logging for the screener service.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CatalogConfig, ChartinkConfig, Config, ObservabilityConfig, ServerConfig};
pub use error::{Error, Result};
