//! Shared infrastructure for the inscript editor crates: error taxonomy,
//! configuration, and (behind the `telemetry` feature) tracing setup.

pub mod config;
pub mod error;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use config::{EditorConfig, WorkspaceConfig};
pub use error::{
    ConfigError, InscriptError, LoadError, Result, StepError, SyncError, WorkflowError,
};
