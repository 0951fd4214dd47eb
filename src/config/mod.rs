//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the `cats` binary)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CatsError, Result};
use crate::protocol::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::transport::PeerTarget;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Requester session configuration
    #[serde(default)]
    pub requester: RequesterConfig,

    /// Service host configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| CatsError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| CatsError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(target) = std::env::var("CATS_TARGET") {
            config.requester.target = Some(target);
        }
        if let Ok(ms) = std::env::var("CATS_OPEN_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.requester.open_timeout_ms = Some(ms);
            }
        }
        if let Ok(ms) = std::env::var("CATS_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.service.request_timeout_ms = ms;
            }
        }
        if let Ok(level) = std::env::var("CATS_LOG_LEVEL") {
            config.logging.level = level;
        }

        config
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(self, other: Self) -> Self {
        let service_defaults = ServiceConfig::default();
        let logging_defaults = LoggingConfig::default();

        Self {
            requester: RequesterConfig {
                target: other.requester.target.or(self.requester.target),
                target_origin: other.requester.target_origin.or(self.requester.target_origin),
                open_timeout_ms: other
                    .requester
                    .open_timeout_ms
                    .or(self.requester.open_timeout_ms),
            },
            service: ServiceConfig {
                request_timeout_ms: if other.service.request_timeout_ms
                    != service_defaults.request_timeout_ms
                {
                    other.service.request_timeout_ms
                } else {
                    self.service.request_timeout_ms
                },
                allowed_origins: if other.service.allowed_origins.is_empty() {
                    self.service.allowed_origins
                } else {
                    other.service.allowed_origins
                },
            },
            logging: LoggingConfig {
                level: if other.logging.level != logging_defaults.level {
                    other.logging.level
                } else {
                    self.logging.level
                },
                json: other.logging.json || self.logging.json,
            },
        }
    }
}

/// Requester session configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequesterConfig {
    /// Locator of the service to open (e.g., https://svc.example/pick)
    pub target: Option<String>,

    /// Expected service origin, when it differs from the locator's
    pub target_origin: Option<String>,

    /// Handshake window in milliseconds; `None` waits until cancelled
    pub open_timeout_ms: Option<u64>,
}

impl RequesterConfig {
    /// Configuration targeting `locator`.
    pub fn with_target(locator: impl Into<String>) -> Self {
        Self {
            target: Some(locator.into()),
            ..Self::default()
        }
    }

    /// The peer to open, if one is configured.
    pub fn peer_target(&self) -> Option<PeerTarget> {
        let target = PeerTarget::new(self.target.as_deref()?);
        Some(match &self.target_origin {
            Some(origin) => target.with_origin(origin),
            None => target,
        })
    }

    /// Handshake window.
    pub fn open_timeout(&self) -> Option<Duration> {
        self.open_timeout_ms.map(Duration::from_millis)
    }
}

/// Service host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Default time `get_request` waits for a capability list
    pub request_timeout_ms: u64,

    /// Requester origins to accept; empty accepts any
    pub allowed_origins: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Default `get_request` timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether handshake messages from `origin` are accepted.
    pub fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == origin)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.request_timeout_ms, 1000);
        assert_eq!(config.logging.level, "info");
        assert!(config.requester.peer_target().is_none());
        assert!(config.requester.open_timeout().is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [requester]
            target = "https://launcher.example/pick"
            target_origin = "https://svc.example"
            open_timeout_ms = 5000

            [service]
            request_timeout_ms = 250
            allowed_origins = ["https://app.example"]
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        let target = config.requester.peer_target().unwrap();
        assert_eq!(target.locator, "https://launcher.example/pick");
        assert_eq!(target.origin, "https://svc.example");
        assert_eq!(config.requester.open_timeout(), Some(Duration::from_millis(5000)));
        assert_eq!(config.service.request_timeout(), Duration::from_millis(250));
        assert!(config.service.allows("https://app.example"));
        assert!(!config.service.allows("https://evil.example"));
        assert!(!config.logging.json);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"\njson = true").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.service, ServiceConfig::default());
    }

    #[test]
    fn test_config_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_allow_list_accepts_any() {
        assert!(ServiceConfig::default().allows("https://anything.example"));
    }

    #[test]
    fn test_merge_prefers_other() {
        let base = Config {
            requester: RequesterConfig::with_target("https://a.example"),
            ..Config::default()
        };
        let overlay = Config {
            service: ServiceConfig {
                request_timeout_ms: 50,
                allowed_origins: vec![],
            },
            ..Config::default()
        };

        let merged = base.merge(overlay);
        assert_eq!(merged.requester.target.as_deref(), Some("https://a.example"));
        assert_eq!(merged.service.request_timeout_ms, 50);
        assert_eq!(merged.logging.level, "info");
    }
}
