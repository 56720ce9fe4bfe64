mod auth;
mod bus;
mod cache;
mod observability;
mod pipeline;
mod pool;
mod server;
mod tiers;

pub use auth::*;
pub use bus::*;
pub use cache::*;
pub use observability::*;
pub use pipeline::*;
pub use pool::*;
pub use server::*;
pub use tiers::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Path to the tier catalog TOML (`TIER_CONFIG_PATH`). When `None`,
    /// [`TierCatalog::builtin_default`] is used.
    #[serde(default)]
    pub tier_config_path: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Empty vec
    /// means everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.pool.database_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "pool.database_url".into(),
                message: "database_url must not be empty".into(),
            });
        }

        if self.pool.pool_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "pool.pool_size".into(),
                message: "pool_size must be greater than 0".into(),
            });
        }

        if self.pool.acquire_retries == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "pool.acquire_retries".into(),
                message: "acquire_retries is 0 — the no-pool fallback will engage on the very first transient failure".into(),
            });
        }

        if self.cache.max_entries == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "cache.max_entries".into(),
                message: "max_entries must be greater than 0".into(),
            });
        }

        if self.bus.subscriber_buffer == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "bus.subscriber_buffer".into(),
                message: "subscriber_buffer must be greater than 0".into(),
            });
        }

        if self.job.max_global_workers == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "job.max_global_workers".into(),
                message: "max_global_workers must be greater than 0".into(),
            });
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        if let Some(path) = &self.tier_config_path {
            if !std::path::Path::new(path).exists() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "tier_config_path".into(),
                    message: format!("{path} does not exist — falling back to built-in tiers"),
                });
            }
        }

        errors
    }

    /// Resolve the tier catalog from `tier_config_path`, or the built-in
    /// default when unset/unreadable (`spec.md` §4.2 `resolve`).
    pub fn load_tier_catalog(&self) -> TierCatalog {
        if let Some(path) = &self.tier_config_path {
            if let Ok(catalog) = TierCatalog::load_from_path(std::path::Path::new(path)) {
                return catalog;
            }
            tracing::warn!(path, "failed to load tier config, using built-in default");
        }
        TierCatalog::builtin_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                port: 8080,
                host: "127.0.0.1".into(),
                ..ServerConfig::default()
            },
            pool: PoolConfig {
                database_url: "sqlite://test.db".into(),
                ..PoolConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.port").expect("expected server.port error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn empty_database_url_is_error() {
        let mut cfg = valid_config();
        cfg.pool.database_url = String::new();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "pool.database_url").is_some());
    }

    #[test]
    fn zero_pool_size_is_error() {
        let mut cfg = valid_config();
        cfg.pool.pool_size = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "pool.pool_size").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn zero_acquire_retries_is_warning() {
        let mut cfg = valid_config();
        cfg.pool.acquire_retries = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "pool.acquire_retries").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.cors.allowed_origins").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn missing_tier_config_path_is_warning() {
        let mut cfg = valid_config();
        cfg.tier_config_path = Some("/does/not/exist.toml".into());
        let issues = cfg.validate();
        let issue = find_issue(&issues, "tier_config_path").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn no_tier_config_path_loads_builtin() {
        let cfg = valid_config();
        let catalog = cfg.load_tier_catalog();
        assert!(catalog.tiers.contains_key(&crate::model::Tier::Free));
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(
            format!("{err}"),
            "[ERROR] server.port: port must be greater than 0"
        );
    }
}
