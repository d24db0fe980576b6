//! Tracing setup for inscript binaries.
//!
//! # Usage
//!
//! ```ignore
//! use inscript_common::telemetry::{self, TelemetryConfig};
//!
//! fn main() {
//!     telemetry::init(TelemetryConfig::from_env("inscript-cli"));
//!     tracing::info!("ready");
//! }
//! ```

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, used as the default filter target
    pub service_name: String,
    /// Console log level (default: INFO, DEBUG in debug builds)
    pub console_level: Level,
    /// Include span/target details in console output
    pub verbose: bool,
}

impl TelemetryConfig {
    /// Load config from environment variables.
    ///
    /// - `RUST_LOG`: Standard env filter (optional, overrides console_level)
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            service_name: service_name.into(),
            console_level,
            verbose: false,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Initialize tracing.
///
/// Call once at startup. Logs go to stderr so command output on stdout stays
/// clean for piping.
pub fn init(config: TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,{}={},inscript_editor_sync={},inscript_editor_core={}",
            config.service_name.replace('-', "_"),
            config.console_level,
            config.console_level,
            config.console_level,
        ))
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.verbose)
        .compact()
        .with_filter(filter);

    // try_init so tests and embedders that already installed a subscriber
    // don't panic.
    let _ = tracing_subscriber::registry().with(console_layer).try_init();
}
