//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Archival sweep configuration.
    #[serde(default)]
    pub archival: ArchivalConfig,
    /// Back-office authentication.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for a single HTTP request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Longest accepted sweep interval, one year.
pub const MAX_INTERVAL_HOURS: u64 = 24 * 366;

/// Archival sweep configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchivalConfig {
    /// Whether the background sweep runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Shipped tickets idle for longer than this are archived.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Hours between two scheduled sweeps.
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    /// Maximum rows archived by a single UPDATE statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Upper bound for one sweep run, in seconds.
    #[serde(default = "default_sweep_timeout_secs")]
    pub sweep_timeout_secs: u64,
}

impl Default for ArchivalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
            interval_hours: default_interval_hours(),
            batch_size: default_batch_size(),
            sweep_timeout_secs: default_sweep_timeout_secs(),
        }
    }
}

impl ArchivalConfig {
    /// Retention window as a chrono duration.
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    /// Interval between scheduled sweeps, at least one hour.
    #[must_use]
    pub fn interval(&self) -> Duration {
        let hours = self.interval_hours.clamp(1, MAX_INTERVAL_HOURS);
        Duration::from_secs(hours * 3600)
    }

    /// Timeout applied to a single sweep.
    #[must_use]
    pub const fn sweep_timeout(&self) -> Duration {
        Duration::from_secs(self.sweep_timeout_secs)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if !(1..=MAX_INTERVAL_HOURS).contains(&self.interval_hours) {
            return Err(config::ConfigError::Message(format!(
                "archival.interval_hours must be between 1 and {MAX_INTERVAL_HOURS}, got {}",
                self.interval_hours
            )));
        }
        if self.sweep_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "archival.sweep_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Role of a back-office account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    /// Full access, including archive and activity log.
    Admin,
    /// Ticket processing only.
    Staff,
}

impl StaffRole {
    /// Returns whether this role may use admin-only endpoints.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// A back-office account authenticated by a static bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct StaffAccount {
    /// Display name, recorded as the actor in the activity log.
    pub name: String,
    /// Account role.
    pub role: StaffRole,
    /// Bearer token.
    pub token: String,
}

/// Back-office authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Configured staff accounts.
    #[serde(default)]
    pub staff: Vec<StaffAccount>,
}

impl AuthConfig {
    /// Look up the account owning `token`.
    #[must_use]
    pub fn find_by_token(&self, token: &str) -> Option<&StaffAccount> {
        if token.is_empty() {
            return None;
        }
        self.staff.iter().find(|account| account.token == token)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_true() -> bool {
    true
}

const fn default_retention_days() -> u32 {
    30
}

const fn default_interval_hours() -> u64 {
    24
}

const fn default_batch_size() -> u32 {
    500
}

const fn default_sweep_timeout_secs() -> u64 {
    600
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `RMADESK_ENV`)
    /// 4. Environment variables with `RMADESK_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("RMADESK_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("RMADESK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::checked(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("RMADESK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::checked(config)
    }

    fn checked(config: config::Config) -> Result<Self, config::ConfigError> {
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        self.archival.validate()
    }
}
