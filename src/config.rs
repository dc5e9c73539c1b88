//! Configuration management for ledgerd.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main configuration for the ledgerd service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerdConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission-control configuration
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Repeated-failure guard configuration
    #[serde(default)]
    pub guard: GuardConfig,

    /// Ledger store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for LedgerdConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            admission: AdmissionConfig::default(),
            guard: GuardConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Admission-control configuration.
///
/// Capacities are admitted requests per second per key, which is also the
/// maximum burst size of each token bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Per-client-IP capacity (10,000 requests per minute = 166 per second)
    #[serde(default = "default_ip_capacity")]
    pub ip_capacity: u32,

    /// Per-target-user capacity
    #[serde(default = "default_user_capacity")]
    pub user_capacity: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            ip_capacity: default_ip_capacity(),
            user_capacity: default_user_capacity(),
        }
    }
}

fn default_ip_capacity() -> u32 {
    166
}

fn default_user_capacity() -> u32 {
    5
}

/// Repeated-failure guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Rolling lookback window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Failed-transfer count within the window that triggers denial
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

fn default_window_secs() -> u64 {
    86_400
}

fn default_failure_threshold() -> u32 {
    3
}

/// Ledger store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "./ledger.db".to_string()
}

impl LedgerdConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: LedgerdConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the admission layer cannot run with.
    ///
    /// A bucket's capacity doubles as its refill rate, so a zero capacity
    /// has no meaningful tick interval.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.admission.ip_capacity == 0 {
            return Err(crate::error::LedgerError::Config(
                "admission.ip_capacity must be positive".to_string(),
            ));
        }
        if self.admission.user_capacity == 0 {
            return Err(crate::error::LedgerError::Config(
                "admission.user_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
