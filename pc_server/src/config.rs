//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use pi_cockpit::{
    admin::DEFAULT_GRACE,
    db::{DatabaseConfig, config::DEFAULT_DATABASE_URL},
    sso::SsoConfig,
};
use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

/// Default bind address when neither `--bind` nor `SERVER_BIND` is given
pub const DEFAULT_BIND: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    3000,
);

/// Longest accepted restart grace delay
pub const MAX_RESTART_GRACE_MS: u64 = 10_000;

/// Longest accepted auto-update interval (one week)
pub const MAX_AUTO_UPDATE_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database and file locations, shared with the operator CLI
    pub storage: StorageConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Restart, shutdown and update behaviour
    pub admin: AdminConfig,
    /// Prometheus listener; metrics are off when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Present only when every SSO variable is set
    pub sso: Option<SsoConfig>,
}

/// Everything needed to open the persisted state
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Password hashing pepper (may be empty)
    pub password_pepper: String,
    /// Speedtest scheduler config file
    pub scheduler_config_path: PathBuf,
    /// Scoreboard file
    pub scores_path: PathBuf,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// JWT signing secret (required)
    pub jwt_secret: String,
    /// Add `Secure` to the session cookie
    pub cookie_secure: bool,
}

/// Admin and auto-update configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Command line of the external update procedure
    pub update_command: String,
    /// Minutes between auto-update checks
    pub auto_update_interval_minutes: u64,
    /// Delay before acting on restart/shutdown, in milliseconds
    pub restart_grace_ms: u64,
}

impl AdminConfig {
    pub fn auto_update_interval(&self) -> Duration {
        Duration::from_secs(self.auto_update_interval_minutes.saturating_mul(60))
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_vars(bind_override, database_url_override, |key| {
            std::env::var(key).ok()
        })
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_vars<F>(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        vars: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_optional(&vars, "SERVER_BIND")?.unwrap_or(DEFAULT_BIND),
        };

        let storage = StorageConfig::from_vars(database_url_override, &vars);

        // Security configuration (REQUIRED)
        let jwt_secret = vars("JWT_SECRET").ok_or_else(|| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let security = SecurityConfig {
            jwt_secret,
            cookie_secure: parse_env_or(&vars, "COOKIE_SECURE", false),
        };

        let admin = AdminConfig {
            update_command: vars("UPDATE_COMMAND").unwrap_or_else(|| "bash start.sh 0".to_string()),
            auto_update_interval_minutes: parse_env_or(&vars, "AUTO_UPDATE_INTERVAL_MINUTES", 30),
            restart_grace_ms: parse_env_or(
                &vars,
                "RESTART_GRACE_MS",
                DEFAULT_GRACE.as_millis() as u64,
            ),
        };

        let metrics_bind = parse_optional(&vars, "METRICS_BIND")?;
        let sso = sso_from_vars(&vars);

        Ok(ServerConfig {
            bind,
            storage,
            security,
            admin,
            metrics_bind,
            sso,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.admin.auto_update_interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                var: "AUTO_UPDATE_INTERVAL_MINUTES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.admin.auto_update_interval_minutes > MAX_AUTO_UPDATE_INTERVAL_MINUTES {
            return Err(ConfigError::Invalid {
                var: "AUTO_UPDATE_INTERVAL_MINUTES".to_string(),
                reason: format!("Must be at most {}", MAX_AUTO_UPDATE_INTERVAL_MINUTES),
            });
        }

        if self.admin.restart_grace_ms > MAX_RESTART_GRACE_MS {
            return Err(ConfigError::Invalid {
                var: "RESTART_GRACE_MS".to_string(),
                reason: format!("Must be at most {}", MAX_RESTART_GRACE_MS),
            });
        }

        Ok(())
    }
}

impl StorageConfig {
    /// Load storage settings only; used by the operator CLI
    pub fn from_env(database_url_override: Option<String>) -> Self {
        Self::from_vars(database_url_override, &|key: &str| std::env::var(key).ok())
    }

    fn from_vars<F>(database_url_override: Option<String>, vars: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = database_url_override
            .or_else(|| vars("DATABASE_URL"))
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or(vars, "DB_MAX_CONNECTIONS", 5),
            connection_timeout_secs: parse_env_or(vars, "DB_CONNECTION_TIMEOUT", 5),
        };

        StorageConfig {
            database,
            password_pepper: vars("PASSWORD_PEPPER").unwrap_or_default(),
            scheduler_config_path: vars("SCHEDULER_CONFIG_PATH")
                .unwrap_or_else(|| "config/speedtest.json".to_string())
                .into(),
            scores_path: vars("SCORES_PATH")
                .unwrap_or_else(|| "config/scores.json".to_string())
                .into(),
        }
    }
}

fn sso_from_vars<F>(vars: &F) -> Option<SsoConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let values = [
        vars("SSO_CLIENT_ID"),
        vars("SSO_TENANT_ID"),
        vars("SSO_CLIENT_SECRET"),
        vars("SSO_CLOUD_INSTANCE"),
    ];

    match values {
        [Some(client_id), Some(tenant_id), Some(client_secret), Some(cloud_instance)] => {
            Some(SsoConfig {
                client_id,
                tenant_id,
                client_secret,
                cloud_instance,
            })
        }
        [None, None, None, None] => None,
        _ => {
            tracing::warn!("SSO partially configured; all four SSO_* variables are needed");
            None
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T, F>(vars: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    vars(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Optional variable that must parse when present
fn parse_optional<T, F>(vars: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    vars(key)
        .map(|v| {
            v.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
