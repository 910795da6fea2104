//! Gateway configuration.
//!
//! Values come from an optional TOML file, then `CGW_*` environment
//! variables override individual keys.
//!
//! | Variable                   | Default             |
//! |----------------------------|---------------------|
//! | `CGW_HOST`                 | `127.0.0.1`         |
//! | `CGW_PORT`                 | `4000`              |
//! | `CGW_ENVIRONMENT`          | `development`       |
//! | `CGW_TABLE_PREFIX`         | `fly`               |
//! | `CGW_REDIS_URL`            | unset               |
//! | `CGW_NOTIFICATION_CHANNEL` | `cgw:notifications` |
//! | `CGW_AUDIT_STREAM_MAXLEN`  | `100000`            |
//! | `CGW_AUDIT_TIMEOUT_MS`     | `250`               |
//! | `CGW_PUBLISH_TIMEOUT_MS`   | `250`               |
//! | `CGW_MAX_BODY_BYTES`       | `8388608`           |
//! | `CGW_EDIT_ROLE`            | `edit_all`          |
//! | `CGW_BACKEND`              | `memory`            |
//! | `CGW_ENGINE_URL`           | unset               |
//! | `CGW_AUTH_URL`             | unset               |

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::auth::{AuthUser, DEFAULT_EDIT_ROLE};

/// Configuration errors. All of them abort startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: '{value}'")]
    Env { key: String, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Deployment environment. Production hides failure traces from clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(()),
        }
    }
}

/// Which graph engine backs the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Memory {
        #[serde(default = "default_true")]
        seed_demo: bool,
    },
    Remote {
        url: String,
    },
}

/// Which identity provider resolves caller tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AuthConfig {
    Static {
        #[serde(default)]
        tokens: HashMap<String, AuthUser>,
    },
    Remote {
        url: String,
    },
}

fn default_true() -> bool {
    true
}

/// Runtime configuration for one gateway process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub table_prefix: String,
    /// Enables the Redis audit store and the cross-process notification bus.
    pub redis_url: Option<String>,
    pub notification_channel: String,
    pub audit_stream_maxlen: usize,
    pub audit_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    pub max_body_bytes: usize,
    pub edit_role: String,
    pub backend: BackendConfig,
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            environment: Environment::Development,
            table_prefix: "fly".to_string(),
            redis_url: None,
            notification_channel: "cgw:notifications".to_string(),
            audit_stream_maxlen: 100_000,
            audit_timeout_ms: 250,
            publish_timeout_ms: 250,
            max_body_bytes: 8 * 1024 * 1024,
            edit_role: DEFAULT_EDIT_ROLE.to_string(),
            backend: BackendConfig::Memory { seed_demo: true },
            auth: AuthConfig::Static {
                tokens: HashMap::new(),
            },
        }
    }
}

fn env_parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| ConfigError::Env {
            key: key.to_string(),
            value,
        }),
    }
}

impl GatewayConfig {
    /// Load from `path` (if any), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Override keys from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("CGW_HOST") {
            self.host = v;
        }
        if let Some(v) = env_parse(&lookup, "CGW_PORT")? {
            self.port = v;
        }
        if let Some(v) = env_parse(&lookup, "CGW_ENVIRONMENT")? {
            self.environment = v;
        }
        if let Some(v) = lookup("CGW_TABLE_PREFIX") {
            self.table_prefix = v;
        }
        if let Some(v) = lookup("CGW_REDIS_URL") {
            self.redis_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("CGW_NOTIFICATION_CHANNEL") {
            self.notification_channel = v;
        }
        if let Some(v) = env_parse(&lookup, "CGW_AUDIT_STREAM_MAXLEN")? {
            self.audit_stream_maxlen = v;
        }
        if let Some(v) = env_parse(&lookup, "CGW_AUDIT_TIMEOUT_MS")? {
            self.audit_timeout_ms = v;
        }
        if let Some(v) = env_parse(&lookup, "CGW_PUBLISH_TIMEOUT_MS")? {
            self.publish_timeout_ms = v;
        }
        if let Some(v) = env_parse(&lookup, "CGW_MAX_BODY_BYTES")? {
            self.max_body_bytes = v;
        }
        if let Some(v) = lookup("CGW_EDIT_ROLE") {
            self.edit_role = v;
        }

        match (lookup("CGW_BACKEND").as_deref(), lookup("CGW_ENGINE_URL")) {
            (Some("memory"), _) => self.backend = BackendConfig::Memory { seed_demo: true },
            (Some("remote"), Some(url)) | (None, Some(url)) => {
                self.backend = BackendConfig::Remote { url }
            }
            (Some("remote"), None) => {
                if !matches!(self.backend, BackendConfig::Remote { .. }) {
                    return Err(ConfigError::Invalid(
                        "CGW_BACKEND=remote requires CGW_ENGINE_URL".to_string(),
                    ));
                }
            }
            (Some(other), _) => {
                return Err(ConfigError::Env {
                    key: "CGW_BACKEND".to_string(),
                    value: other.to_string(),
                })
            }
            (None, None) => {}
        }

        if let Some(url) = lookup("CGW_AUTH_URL") {
            self.auth = AuthConfig::Remote { url };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_prefix.is_empty() {
            return Err(ConfigError::Invalid("table_prefix must not be empty".to_string()));
        }
        if self.edit_role.is_empty() {
            return Err(ConfigError::Invalid("edit_role must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}
