//! Editor and workspace configuration.
//!
//! Every value has a default; the environment only overrides. Binaries are
//! expected to load `.env` (via dotenvy) before calling `from_env`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Timing knobs for history capture and draft synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorConfig {
    /// Quiet period before a burst of edits becomes a history entry.
    pub capture_delay: Duration,
    /// Quiet period before a changed history is written to the draft store.
    pub sync_delay: Duration,
    /// Quiet period before a pure cursor move is written to the draft store.
    pub cursor_sync_delay: Duration,
    /// How long to wait for the editing surface to acknowledge a
    /// programmatic load before edit notifications are accepted again.
    pub load_ack_timeout: Duration,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            capture_delay: Duration::from_millis(1000),
            sync_delay: Duration::from_millis(2000),
            cursor_sync_delay: Duration::from_millis(500),
            load_ack_timeout: Duration::from_millis(1000),
        }
    }
}

impl EditorConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional env vars (milliseconds):
    /// - `INSCRIPT_CAPTURE_DELAY_MS` (default: 1000)
    /// - `INSCRIPT_SYNC_DELAY_MS` (default: 2000)
    /// - `INSCRIPT_CURSOR_SYNC_DELAY_MS` (default: 500)
    /// - `INSCRIPT_LOAD_ACK_TIMEOUT_MS` (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            capture_delay: env_millis("INSCRIPT_CAPTURE_DELAY_MS")?
                .unwrap_or(defaults.capture_delay),
            sync_delay: env_millis("INSCRIPT_SYNC_DELAY_MS")?.unwrap_or(defaults.sync_delay),
            cursor_sync_delay: env_millis("INSCRIPT_CURSOR_SYNC_DELAY_MS")?
                .unwrap_or(defaults.cursor_sync_delay),
            load_ack_timeout: env_millis("INSCRIPT_LOAD_ACK_TIMEOUT_MS")?
                .unwrap_or(defaults.load_ack_timeout),
        })
    }
}

/// Where posts and drafts live, and how deploy steps run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceConfig {
    pub posts_dir: PathBuf,
    pub drafts_dir: PathBuf,
    /// Working directory for publish/commit/push commands.
    pub project_root: PathBuf,
    /// Shell command that regenerates the static site.
    pub publish_command: String,
    pub allow_push: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            posts_dir: PathBuf::from("posts"),
            drafts_dir: PathBuf::from("drafts"),
            project_root: PathBuf::from("."),
            publish_command: "npm run publish".to_string(),
            allow_push: false,
        }
    }
}

impl WorkspaceConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `INSCRIPT_POSTS_DIR` (default: posts)
    /// - `INSCRIPT_DRAFTS_DIR` (default: drafts)
    /// - `INSCRIPT_PROJECT_ROOT` (default: .)
    /// - `INSCRIPT_PUBLISH_COMMAND` (default: npm run publish)
    /// - `ALLOW_PUSH` (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let allow_push = match std::env::var("ALLOW_PUSH") {
            Ok(value) => parse_bool("ALLOW_PUSH", &value)?,
            Err(_) => defaults.allow_push,
        };

        Ok(Self {
            posts_dir: env_path("INSCRIPT_POSTS_DIR").unwrap_or(defaults.posts_dir),
            drafts_dir: env_path("INSCRIPT_DRAFTS_DIR").unwrap_or(defaults.drafts_dir),
            project_root: env_path("INSCRIPT_PROJECT_ROOT").unwrap_or(defaults.project_root),
            publish_command: std::env::var("INSCRIPT_PUBLISH_COMMAND")
                .ok()
                .filter(|cmd| !cmd.trim().is_empty())
                .unwrap_or(defaults.publish_command),
            allow_push,
        })
    }
}

fn env_path(var: &'static str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_millis(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => parse_millis(var, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::Invalid {
            var,
            value: value.to_string(),
            message: e.to_string(),
        })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            message: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editor_defaults_keep_windows_distinct() {
        let config = EditorConfig::default();
        assert!(config.capture_delay < config.sync_delay);
        assert!(config.cursor_sync_delay < config.sync_delay);
    }

    #[test]
    fn test_parse_millis() {
        assert_eq!(
            parse_millis("X", " 250 ").unwrap(),
            Duration::from_millis(250)
        );
        assert!(matches!(
            parse_millis("X", "soon"),
            Err(ConfigError::Invalid { var: "X", .. })
        ));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("ALLOW_PUSH", "true").unwrap());
        assert!(parse_bool("ALLOW_PUSH", "YES").unwrap());
        assert!(!parse_bool("ALLOW_PUSH", "false").unwrap());
        assert!(!parse_bool("ALLOW_PUSH", "").unwrap());
        assert!(parse_bool("ALLOW_PUSH", "maybe").is_err());
    }
}
