//! Server configuration
//!
//! Central location for configuration constants, resource limits and the
//! environment-driven `ServerConfig` used by the bootstrap.

use crate::error::{AppError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

// ===== Store Resilience =====

/// Retries attempted after the first failed call to the document store
pub const MAX_RETRIES: u32 = 3;

/// Delay before the first retry in milliseconds; doubles on every attempt
pub const INITIAL_BACKOFF_MS: u64 = 100;

/// Upper bound for a single retry delay in milliseconds
pub const MAX_BACKOFF_MS: u64 = 1_000;

/// Random jitter added to each retry delay in milliseconds
pub const RETRY_JITTER_MS: u64 = 50;

/// Attempts made by read-modify-write helpers before reporting a conflict
pub const MAX_CAS_ATTEMPTS: usize = 5;

// ===== Snapshot Listeners =====

/// Window during which repeated change notifications for one collection
/// collapse into a single listener refresh
pub const SNAPSHOT_DEBOUNCE_MS: u64 = 50;

/// Capacity of the per-collection change channel
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// How long an active-alert long poll waits for a change by default
pub const ALERT_POLL_DEFAULT_SECS: u64 = 25;

/// Longest wait a client may ask an active-alert long poll for
pub const ALERT_POLL_MAX_SECS: u64 = 60;

// ===== HTTP Surface =====

/// Development header carrying the caller's user id
pub const CALLER_ID_HEADER: &str = "x-user-id";

/// Response header set when a list was served from a degraded read
pub const DEGRADED_HEADER: &str = "x-data-degraded";

/// Number of reports included in the dashboard's recent slice
pub const RECENT_REPORTS_LIMIT: usize = 5;

// ===== Defaults =====

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_DATABASE_PATH: &str = "./data/safeschool.db";

/// Session tokens live 12 hours unless SESSION_TTL_SECS says otherwise
pub const DEFAULT_SESSION_TTL_SECS: u64 = 12 * 60 * 60;

/// Shortest accepted session secret; shorter keys are trivially guessable
pub const MIN_SESSION_SECRET_LEN: usize = 16;

/// Where documents live for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local maps, lost on restart
    Memory,
    /// SQLite document table at the given path
    Sqlite(PathBuf),
}

/// Admin account created at startup when none exists with this email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub storage: StorageBackend,
    /// Enables signed session tokens instead of the development header
    pub session_secret: Option<String>,
    pub session_ttl: Duration,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            storage: StorageBackend::Memory,
            session_secret: None,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            bootstrap_admin: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Generic(format!("Invalid BIND_ADDR: {}", e)))?;

        let storage = match var("STORAGE_BACKEND")
            .unwrap_or_else(|| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "sqlite" => StorageBackend::Sqlite(PathBuf::from(
                var("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            )),
            other => {
                return Err(AppError::Generic(format!(
                    "Unknown STORAGE_BACKEND '{}' (expected 'memory' or 'sqlite')",
                    other
                )))
            }
        };

        let session_secret = var("SESSION_SECRET");
        if let Some(secret) = &session_secret {
            if secret.len() < MIN_SESSION_SECRET_LEN {
                return Err(AppError::Generic(format!(
                    "SESSION_SECRET must be at least {} characters",
                    MIN_SESSION_SECRET_LEN
                )));
            }
        }

        let session_ttl = match var("SESSION_TTL_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .map_err(|_| AppError::Generic(format!("Invalid SESSION_TTL_SECS: {}", raw)))?;
                if secs == 0 {
                    return Err(AppError::Generic(
                        "SESSION_TTL_SECS must be greater than 0".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        };

        let bootstrap_admin = var("BOOTSTRAP_ADMIN_EMAIL").map(|email| BootstrapAdmin {
            name: var("BOOTSTRAP_ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
            email,
        });

        Ok(Self {
            bind_addr,
            storage,
            session_secret,
            session_ttl,
            bootstrap_admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.session_secret.is_none());
        assert_eq!(
            config.session_ttl,
            Duration::from_secs(DEFAULT_SESSION_TTL_SECS)
        );
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn test_sqlite_backend_and_admin() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "SQLite"),
            ("DATABASE_PATH", "/tmp/school.db"),
            ("BOOTSTRAP_ADMIN_EMAIL", "principal@school.test"),
        ]))
        .unwrap();

        assert_eq!(
            config.storage,
            StorageBackend::Sqlite(PathBuf::from("/tmp/school.db"))
        );
        let admin = config.bootstrap_admin.unwrap();
        assert_eq!(admin.email, "principal@school.test");
        assert_eq!(admin.name, "Administrator");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ServerConfig::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("STORAGE_BACKEND", "redis")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("SESSION_SECRET", "short")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("SESSION_TTL_SECS", "0")])).is_err());
    }
}
