//! Service configuration
//!
//! Serde defaults, overlaid by an optional `config/bridge-audit.{toml,yaml,json}`
//! file, overlaid by `AUDIT__<SECTION>__<KEY>` environment variables.

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::audit::logger::DEFAULT_MAX_APPEND_RETRIES;
use crate::error::{AuditError, AuditResult};

pub const DEFAULT_CONFIG_FILE: &str = "config/bridge-audit";
const DEFAULT_LOG_FILTER: &str = "bridge_audit=debug,tower_http=debug";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub signing: SigningConfig,
    pub auth: AuthConfig,
    pub chain: ChainConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://bridge-audit.db".to_string(),
            max_connections: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Hex secret key file written by `key-manager generate`.
    pub key_path: Option<String>,
    /// Start with a throwaway key when no key file is configured.
    pub allow_ephemeral_key: bool,
    pub verify_signatures: bool,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            key_path: None,
            allow_ephemeral_key: false,
            verify_signatures: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for caller bearer tokens.
    pub jwt_secret: String,
    pub privileged_roles: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            privileged_roles: vec!["bank_admin".to_string(), "compliance_officer".to_string()],
        }
    }
}

impl AuthConfig {
    pub fn is_privileged(&self, role: &str) -> bool {
        self.privileged_roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub max_append_retries: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_append_retries: DEFAULT_MAX_APPEND_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Install the global subscriber. `RUST_LOG` overrides the default filter.
    ///
    /// Returns an error if a subscriber is already installed.
    pub fn init(&self) -> AuditResult<()> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        let (pretty, json) = match self.format {
            LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
            LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(pretty)
            .with(json)
            .try_init()
            .map_err(|e| AuditError::ConfigError(format!("Failed to install tracing subscriber: {}", e)))
    }
}

impl AppConfig {
    /// Load from the default file location and the environment.
    pub fn load() -> AuditResult<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load with `path` (extension optional) as the file layer. A missing file
    /// is not an error.
    pub fn load_from(path: &Path) -> AuditResult<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("AUDIT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.privileged_roles")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AuditError::ConfigError(format!("Failed to read configuration: {}", e)))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| AuditError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AuditResult<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(AuditError::ConfigError(
                "auth.jwt_secret must be set".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(AuditError::ConfigError(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.chain.max_append_retries == 0 {
            return Err(AuditError::ConfigError(
                "chain.max_append_retries must be at least 1".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(AuditError::ConfigError(
                "database.url must be set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "test-secret".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.chain.max_append_retries, DEFAULT_MAX_APPEND_RETRIES);
        assert!(config.signing.verify_signatures);
        assert!(!config.signing.allow_ephemeral_key);
        assert!(config.auth.is_privileged("bank_admin"));
        assert!(config.auth.is_privileged("compliance_officer"));
        assert!(!config.auth.is_privileged("teller"));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_validation() {
        assert!(valid_config().validate().is_ok());
        assert!(matches!(
            AppConfig::default().validate(),
            Err(AuditError::ConfigError(_))
        ));

        let mut config = valid_config();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.chain.max_append_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_layers_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge-audit.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\nport = 8088\n\n[auth]\njwt_secret = \"from-file\"\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.jwt_secret, "from-file");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.bind_address(), "0.0.0.0:8088");
    }

    #[test]
    fn test_load_rejects_file_without_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge-audit.toml");
        std::fs::write(&path, "[server]\nport = 8088\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(AuditError::ConfigError(_))
        ));
    }
}
