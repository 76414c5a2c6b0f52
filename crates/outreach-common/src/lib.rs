//! Shared plumbing for the outreach crates: errors, configuration,
//! telemetry setup and small timing/cache helpers.

#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
pub mod error;
pub mod perf;
pub mod telemetry;

pub use crate::config::{AutoSaveConfig, CacheConfig, Config, FileStore, Loader, Saver};
pub use crate::error::{OutreachError, ParseError, SerDeError};
