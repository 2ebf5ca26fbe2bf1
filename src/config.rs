/// Configuration management for the family records backend
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub sharing: SharingConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub max_connections: u32,
}

/// What happens to existing grants when an owner revokes a share code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevocationPolicy {
    /// Revocation only blocks new redemptions
    KeepGrants,
    /// Revocation also removes every grant on the child
    Cascade,
}

impl RevocationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationPolicy::KeepGrants => "keep-grants",
            RevocationPolicy::Cascade => "cascade",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "keep-grants" | "keep" => Ok(RevocationPolicy::KeepGrants),
            "cascade" => Ok(RevocationPolicy::Cascade),
            _ => Err(AppError::Validation(format!("Invalid revocation policy: {}", s))),
        }
    }
}

/// Share code configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharingConfig {
    pub revocation_policy: RevocationPolicy,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
    /// Separate budget for share-code lookups and redemptions
    pub code_lookups_per_minute: u32,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives
    pub level: String,
    pub format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_directory = PathBuf::from("./data");
        Self {
            service: ServiceConfig {
                hostname: "0.0.0.0".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                database: data_directory.join("family_records.sqlite"),
                data_directory,
                max_connections: 10,
            },
            sharing: SharingConfig {
                revocation_policy: RevocationPolicy::KeepGrants,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_second: 50,
                burst_size: 100,
                code_lookups_per_minute: 60,
            },
            logging: LoggingConfig {
                level: "family_records=debug,tower_http=debug".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let defaults = ServerConfig::default();

        let hostname = env::var("FAMREC_HOSTNAME").unwrap_or(defaults.service.hostname);
        let port = match env::var("FAMREC_PORT") {
            Ok(port) => port
                .parse()
                .map_err(|_| AppError::Validation("Invalid port number".to_string()))?,
            Err(_) => defaults.service.port,
        };

        let data_directory: PathBuf = env::var("FAMREC_DATA_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.data_directory);
        let database = env::var("FAMREC_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("family_records.sqlite"));
        let max_connections = env::var("FAMREC_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.storage.max_connections);

        let revocation_policy = match env::var("FAMREC_REVOCATION_POLICY") {
            Ok(policy) => RevocationPolicy::from_str(&policy)?,
            Err(_) => defaults.sharing.revocation_policy,
        };

        let rate_limit_enabled = env::var("FAMREC_RATE_LIMITS_ENABLED")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit.enabled);
        let requests_per_second = env::var("FAMREC_RATE_LIMIT_RPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit.requests_per_second);
        let burst_size = env::var("FAMREC_RATE_LIMIT_BURST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit.burst_size);
        let code_lookups_per_minute = env::var("FAMREC_RATE_LIMIT_CODE_LOOKUPS_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit.code_lookups_per_minute);

        let level = env::var("RUST_LOG").unwrap_or(defaults.logging.level);
        let format = match env::var("FAMREC_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(ServerConfig {
            service: ServiceConfig { hostname, port },
            storage: StorageConfig {
                data_directory,
                database,
                max_connections,
            },
            sharing: SharingConfig { revocation_policy },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                requests_per_second,
                burst_size,
                code_lookups_per_minute,
            },
            logging: LoggingConfig { level, format },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.service.port == 0 {
            return Err(AppError::Validation("Port cannot be 0".to_string()));
        }

        if self.storage.max_connections == 0 {
            return Err(AppError::Validation(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sharing.revocation_policy, RevocationPolicy::KeepGrants);
    }

    #[test]
    fn test_revocation_policy_from_str() {
        assert_eq!(
            RevocationPolicy::from_str("cascade").unwrap(),
            RevocationPolicy::Cascade
        );
        assert_eq!(
            RevocationPolicy::from_str("KEEP-GRANTS").unwrap(),
            RevocationPolicy::KeepGrants
        );
        assert!(RevocationPolicy::from_str("sometimes").is_err());
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let mut config = ServerConfig::default();
        config.storage.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
