//! Telemetry infrastructure for outreach binaries.
//!
//! Provides:
//! - Tracing with compact console output, filtered by `RUST_LOG`
//! - Prometheus metrics recorder (with the `telemetry` feature)
//!
//! # Usage
//!
//! ```ignore
//! use outreach_common::telemetry::{self, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env("outreach-cli");
//! telemetry::init(config);
//!
//! telemetry::counter!("outreach_draft_local_writes_total").increment(1);
//! tracing::info!("composer started");
//! ```

#[cfg(feature = "telemetry")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "telemetry")]
use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[cfg(feature = "telemetry")]
static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for labeling (e.g., "outreach-cli")
    pub service_name: String,
    /// Console log level (default: INFO, DEBUG in debug builds)
    pub console_level: Level,
}

impl TelemetryConfig {
    /// Load config from environment.
    ///
    /// `RUST_LOG` is read at init time and overrides `console_level`.
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            service_name: service_name.into(),
            console_level,
        }
    }

    /// Override the console level from a config string such as "warn".
    /// Unknown values are ignored.
    pub fn with_level(mut self, level: Option<&str>) -> Self {
        if let Some(level) = level.and_then(|l| l.parse::<Level>().ok()) {
            self.console_level = level;
        }
        self
    }
}

/// Initialize telemetry (metrics + tracing).
///
/// Call once at application startup. Later calls are no-ops.
pub fn init(config: TelemetryConfig) {
    #[cfg(feature = "telemetry")]
    init_metrics();

    init_tracing(config);
}

/// Initialize just the prometheus metrics recorder.
///
/// Returns `None` if another recorder was installed first.
#[cfg(feature = "telemetry")]
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("failed to install prometheus recorder: {}", e);
                None
            }
        })
        .as_ref()
}

/// Render current metrics in Prometheus exposition format.
#[cfg(feature = "telemetry")]
pub fn render() -> String {
    PROMETHEUS_HANDLE
        .get()
        .and_then(|h| h.as_ref())
        .map(|h| h.render())
        .unwrap_or_default()
}

fn init_tracing(config: TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_level.as_str().to_lowercase()));

    // Logs go to stderr so command output on stdout stays clean
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter);

    if tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok()
    {
        tracing::debug!(service = %config.service_name, "telemetry initialized");
    }
}

pub use metrics::{counter, gauge, histogram};
