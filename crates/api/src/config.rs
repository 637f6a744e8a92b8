//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use orders::RetryPolicy;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL stores when set, in-memory otherwise
/// - `INVENTORY_URL`: reach inventory over HTTP when set, in-process otherwise
/// - `INVENTORY_TIMEOUT_MS`, `INVENTORY_MAX_RETRIES`, `INVENTORY_BACKOFF_MS`
/// - `RECOVERY_INTERVAL_SECS` (0 disables), `RECOVERY_GRACE_SECS`
/// - `API_TOKENS`: `token:user-uuid:role` entries, comma separated
/// - `INVENTORY_RPC_PORT`: inventory ledger listener, off unless set (0 also
///   disables). It has no authentication, so only expose it to the order ledger.
/// - `CATALOG_SEED_PATH`: JSON product list loaded at startup
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub inventory_url: Option<String>,
    pub inventory_timeout: Duration,
    pub inventory_max_retries: u32,
    pub inventory_backoff: Duration,
    pub recovery_interval: Option<Duration>,
    pub recovery_grace: Duration,
    pub api_tokens: Option<String>,
    pub inventory_rpc_port: Option<u16>,
    pub catalog_seed_path: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| text(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: text("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: text("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: text("LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or_default(),
            database_url: text("DATABASE_URL"),
            inventory_url: text("INVENTORY_URL"),
            inventory_timeout: parsed("INVENTORY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.inventory_timeout),
            inventory_max_retries: text("INVENTORY_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.inventory_max_retries),
            inventory_backoff: parsed("INVENTORY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.inventory_backoff),
            recovery_interval: match parsed("RECOVERY_INTERVAL_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.recovery_interval,
            },
            recovery_grace: parsed("RECOVERY_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.recovery_grace),
            api_tokens: text("API_TOKENS"),
            inventory_rpc_port: match text("INVENTORY_RPC_PORT").and_then(|p| p.parse().ok()) {
                Some(0) => None,
                Some(port) => Some(port),
                None => defaults.inventory_rpc_port,
            },
            catalog_seed_path: text("CATALOG_SEED_PATH").map(PathBuf::from),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the bind address of the inventory ledger listener, if enabled.
    pub fn inventory_rpc_addr(&self) -> Option<String> {
        self.inventory_rpc_port
            .map(|port| format!("{}:{}", self.host, port))
    }

    /// Timeout and retry settings for inventory calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            call_timeout: self.inventory_timeout,
            max_retries: self.inventory_max_retries,
            initial_backoff: self.inventory_backoff,
            ..RetryPolicy::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            inventory_url: None,
            inventory_timeout: retry.call_timeout,
            inventory_max_retries: retry.max_retries,
            inventory_backoff: retry.initial_backoff,
            recovery_interval: Some(Duration::from_secs(30)),
            recovery_grace: Duration::from_secs(60),
            api_tokens: None,
            inventory_rpc_port: None,
            catalog_seed_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.recovery_interval, Some(Duration::from_secs(30)));
        assert!(config.inventory_rpc_addr().is_none());
    }

    #[test]
    fn test_inventory_listener_is_opt_in() {
        let config = from_pairs(&[("HOST", "10.0.0.5"), ("INVENTORY_RPC_PORT", "3001")]);
        assert_eq!(config.inventory_rpc_addr().as_deref(), Some("10.0.0.5:3001"));
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("INVENTORY_TIMEOUT_MS", "250"),
            ("INVENTORY_MAX_RETRIES", "5"),
            ("INVENTORY_BACKOFF_MS", "10"),
            ("RECOVERY_GRACE_SECS", "5"),
            ("DATABASE_URL", "postgres://localhost/ledgers"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.recovery_grace, Duration::from_secs(5));
        assert!(config.database_url.is_some());

        let policy = config.retry_policy();
        assert_eq!(policy.call_timeout, Duration::from_millis(250));
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(10));
        assert_eq!(policy.max_backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_disables_background_surfaces() {
        let config = from_pairs(&[("RECOVERY_INTERVAL_SECS", "0"), ("INVENTORY_RPC_PORT", "0")]);
        assert!(config.recovery_interval.is_none());
        assert!(config.inventory_rpc_addr().is_none());
    }

    #[test]
    fn test_garbage_falls_back() {
        let config = from_pairs(&[("PORT", "http"), ("INVENTORY_MAX_RETRIES", "-1")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.inventory_max_retries, 3);
    }
}
