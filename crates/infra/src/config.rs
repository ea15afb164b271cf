//! Configuration loading and representation.
//!
//! Everything is read from environment variables. `from_lookup` takes the
//! lookup as a closure so tests never touch the process environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use pkgmg_core::Address;

use crate::retry::RetryConfig;

pub const EVENT_LOG: &str = "PKGMG_EVENT_LOG";
pub const CONTRACT_ADDRESS: &str = "PKGMG_CONTRACT_ADDRESS";
pub const NETWORK: &str = "PKGMG_NETWORK";
pub const START_BLOCK: &str = "PKGMG_START_BLOCK";
pub const HTTP_ADDR: &str = "PKGMG_HTTP_ADDR";
pub const USE_PERSISTENT_STORES: &str = "USE_PERSISTENT_STORES";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const RETRY_MAX_ATTEMPTS: &str = "PKGMG_RETRY_MAX_ATTEMPTS";
pub const RETRY_INITIAL_DELAY_MS: &str = "PKGMG_RETRY_INITIAL_DELAY_MS";
pub const RETRY_MAX_DELAY_MS: &str = "PKGMG_RETRY_MAX_DELAY_MS";

const DEFAULT_NETWORK: &str = "maticmum";
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Where projected entities and cursors are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    /// JSON-lines file with the registry's emitted events.
    pub event_log: PathBuf,
    /// Registry contract the log was taken from (informational).
    pub contract_address: Option<Address>,
    pub network: String,
    /// First block the projection considers.
    pub start_block: u64,
    pub http_addr: SocketAddr,
    pub persistence: Persistence,
    pub retry: RetryConfig,
}

impl IndexerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let event_log = get(EVENT_LOG)
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing(EVENT_LOG))?;

        let contract_address = get(CONTRACT_ADDRESS)
            .map(|raw| parse::<Address>(CONTRACT_ADDRESS, &raw))
            .transpose()?;

        let network = get(NETWORK).unwrap_or_else(|| DEFAULT_NETWORK.to_string());

        let start_block = get(START_BLOCK)
            .map(|raw| parse::<u64>(START_BLOCK, &raw))
            .transpose()?
            .unwrap_or(0);

        let http_addr = parse::<SocketAddr>(
            HTTP_ADDR,
            &get(HTTP_ADDR).unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
        )?;

        let use_persistent = get(USE_PERSISTENT_STORES)
            .map(|raw| parse::<bool>(USE_PERSISTENT_STORES, &raw))
            .transpose()?
            .unwrap_or(false);
        let persistence = if use_persistent {
            let database_url = get(DATABASE_URL).ok_or(ConfigError::Missing(DATABASE_URL))?;
            Persistence::Postgres { database_url }
        } else {
            Persistence::InMemory
        };

        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: get(RETRY_MAX_ATTEMPTS)
                .map(|raw| parse::<u32>(RETRY_MAX_ATTEMPTS, &raw))
                .transpose()?
                .unwrap_or(defaults.max_attempts),
            initial_delay: get(RETRY_INITIAL_DELAY_MS)
                .map(|raw| parse::<u64>(RETRY_INITIAL_DELAY_MS, &raw).map(Duration::from_millis))
                .transpose()?
                .unwrap_or(defaults.initial_delay),
            max_delay: get(RETRY_MAX_DELAY_MS)
                .map(|raw| parse::<u64>(RETRY_MAX_DELAY_MS, &raw).map(Duration::from_millis))
                .transpose()?
                .unwrap_or(defaults.max_delay),
            multiplier: defaults.multiplier,
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: RETRY_MAX_ATTEMPTS,
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            event_log,
            contract_address,
            network,
            start_block,
            http_addr,
            persistence,
            retry,
        })
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<IndexerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IndexerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_log_is_set() {
        let cfg = config(&[(EVENT_LOG, "events.jsonl")]).unwrap();

        assert_eq!(cfg.event_log, PathBuf::from("events.jsonl"));
        assert_eq!(cfg.network, "maticmum");
        assert_eq!(cfg.start_block, 0);
        assert_eq!(cfg.http_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.persistence, Persistence::InMemory);
        assert_eq!(cfg.retry, RetryConfig::default());
        assert_eq!(cfg.contract_address, None);
    }

    #[test]
    fn missing_event_log_is_rejected() {
        assert_eq!(config(&[]), Err(ConfigError::Missing(EVENT_LOG)));
        assert_eq!(config(&[(EVENT_LOG, "  ")]), Err(ConfigError::Missing(EVENT_LOG)));
    }

    #[test]
    fn persistent_stores_require_database_url() {
        let err = config(&[(EVENT_LOG, "e"), (USE_PERSISTENT_STORES, "true")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing(DATABASE_URL));

        let cfg = config(&[
            (EVENT_LOG, "e"),
            (USE_PERSISTENT_STORES, "true"),
            (DATABASE_URL, "postgres://localhost/pkgmg"),
        ])
        .unwrap();
        assert_eq!(
            cfg.persistence,
            Persistence::Postgres {
                database_url: "postgres://localhost/pkgmg".to_string()
            }
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            (EVENT_LOG, "e"),
            (CONTRACT_ADDRESS, "0x89205A3A3b2A69De6Dbf7f01ED13B2108B2c43e7"),
            (NETWORK, "polygon"),
            (START_BLOCK, "31000000"),
            (HTTP_ADDR, "127.0.0.1:3000"),
            (RETRY_MAX_ATTEMPTS, "5"),
            (RETRY_INITIAL_DELAY_MS, "50"),
            (RETRY_MAX_DELAY_MS, "2000"),
        ])
        .unwrap();

        assert_eq!(
            cfg.contract_address.map(|a| a.to_string()),
            Some("0x89205a3a3b2a69de6dbf7f01ed13b2108b2c43e7".to_string())
        );
        assert_eq!(cfg.network, "polygon");
        assert_eq!(cfg.start_block, 31_000_000);
        assert_eq!(cfg.http_addr.port(), 3000);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.initial_delay, Duration::from_millis(50));
        assert_eq!(cfg.retry.max_delay, Duration::from_secs(2));
    }

    #[test]
    fn malformed_values_name_their_key() {
        match config(&[(EVENT_LOG, "e"), (START_BLOCK, "soon")]) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, START_BLOCK),
            other => panic!("Expected Invalid error, got {other:?}"),
        }
        match config(&[(EVENT_LOG, "e"), (CONTRACT_ADDRESS, "0x1234")]) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, CONTRACT_ADDRESS),
            other => panic!("Expected Invalid error, got {other:?}"),
        }
        match config(&[(EVENT_LOG, "e"), (RETRY_MAX_ATTEMPTS, "0")]) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, RETRY_MAX_ATTEMPTS),
            other => panic!("Expected Invalid error, got {other:?}"),
        }
    }
}
