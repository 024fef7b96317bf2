//! Configuration loading and representation.
//!
//! Every setting is optional and read from a `WARDEN_*` environment
//! variable. Malformed values are rejected, never silently defaulted.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::CacheConfig;

pub use warden_observability::LogFormat;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} must be at least {min} (got {value})")]
    BelowMinimum {
        field: &'static str,
        value: String,
        min: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub listen_addr: SocketAddr,
    pub token_key_name: String,
    pub ca_key_name: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub public_key_cache_secs: u64,
    pub validation_cache_secs: u64,
    /// 0 disables the record cache.
    pub record_cache_secs: u64,
    pub record_cache_entries: u64,
    pub cert_validity_days: u64,
    pub bootstrap_max_attempts: u32,
    pub log_format: LogFormat,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            token_key_name: "warden-token".to_string(),
            ca_key_name: "warden-ca".to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 86_400,
            public_key_cache_secs: 60,
            validation_cache_secs: 30,
            record_cache_secs: 60,
            record_cache_entries: 10_000,
            cert_validity_days: 365,
            bootstrap_max_attempts: 5,
            log_format: LogFormat::Json,
        }
    }
}

impl WardenConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup (tests, embedding).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("WARDEN_LISTEN_ADDR") {
            cfg.listen_addr = v.parse::<SocketAddr>().map_err(|e: std::net::AddrParseError| {
                invalid("WARDEN_LISTEN_ADDR", &v, e.to_string())
            })?;
        }
        if let Some(v) = lookup("WARDEN_TOKEN_KEY_NAME") {
            cfg.token_key_name = non_empty("WARDEN_TOKEN_KEY_NAME", v)?;
        }
        if let Some(v) = lookup("WARDEN_CA_KEY_NAME") {
            cfg.ca_key_name = non_empty("WARDEN_CA_KEY_NAME", v)?;
        }
        read_u64(&lookup, "WARDEN_ACCESS_TOKEN_TTL_SECS", &mut cfg.access_token_ttl_secs)?;
        read_u64(&lookup, "WARDEN_REFRESH_TOKEN_TTL_SECS", &mut cfg.refresh_token_ttl_secs)?;
        read_u64(&lookup, "WARDEN_PUBLIC_KEY_CACHE_SECS", &mut cfg.public_key_cache_secs)?;
        read_u64(&lookup, "WARDEN_VALIDATION_CACHE_SECS", &mut cfg.validation_cache_secs)?;
        read_u64(&lookup, "WARDEN_RECORD_CACHE_SECS", &mut cfg.record_cache_secs)?;
        read_u64(&lookup, "WARDEN_RECORD_CACHE_ENTRIES", &mut cfg.record_cache_entries)?;
        read_u64(&lookup, "WARDEN_CERT_VALIDITY_DAYS", &mut cfg.cert_validity_days)?;
        if let Some(v) = lookup("WARDEN_BOOTSTRAP_MAX_ATTEMPTS") {
            cfg.bootstrap_max_attempts = v
                .trim()
                .parse::<u32>()
                .map_err(|e: std::num::ParseIntError| {
                    invalid("WARDEN_BOOTSTRAP_MAX_ATTEMPTS", &v, e.to_string())
                })?;
        }
        if let Some(v) = lookup("WARDEN_LOG_FORMAT") {
            cfg.log_format = LogFormat::parse(&v)
                .ok_or_else(|| invalid("WARDEN_LOG_FORMAT", &v, "expected 'json' or 'pretty'"))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("access_token_ttl_secs", self.access_token_ttl_secs),
            ("refresh_token_ttl_secs", self.refresh_token_ttl_secs),
            ("cert_validity_days", self.cert_validity_days),
        ] {
            if value == 0 {
                return Err(ConfigError::BelowMinimum {
                    field,
                    value: value.to_string(),
                    min: "1".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_secs)
    }

    pub fn public_key_cache(&self) -> Duration {
        Duration::from_secs(self.public_key_cache_secs)
    }

    pub fn validation_cache(&self) -> Duration {
        Duration::from_secs(self.validation_cache_secs)
    }

    /// Record cache settings; disabled when the TTL is zero.
    pub fn record_cache(&self) -> Result<CacheConfig, ConfigError> {
        if self.record_cache_secs == 0 {
            return Ok(CacheConfig::disabled());
        }
        CacheConfig::builder()
            .max_entries(self.record_cache_entries)
            .ttl(Duration::from_secs(self.record_cache_secs))
            .build()
    }
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn non_empty(var: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(invalid(var, &value, "must not be empty"))
    } else {
        Ok(value)
    }
}

fn read_u64<F>(lookup: &F, var: &'static str, slot: &mut u64) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(var) {
        *slot = v
            .trim()
            .parse::<u64>()
            .map_err(|e: std::num::ParseIntError| invalid(var, &v, e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<WardenConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WardenConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(load(&[]).unwrap(), WardenConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = load(&[
            ("WARDEN_LISTEN_ADDR", "127.0.0.1:9000"),
            ("WARDEN_ACCESS_TOKEN_TTL_SECS", "60"),
            ("WARDEN_LOG_FORMAT", "Pretty"),
            ("WARDEN_BOOTSTRAP_MAX_ATTEMPTS", "2"),
        ])
        .unwrap();
        assert_eq!(cfg.listen_addr.port(), 9000);
        assert_eq!(cfg.access_token_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.bootstrap_max_attempts, 2);
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = load(&[("WARDEN_VALIDATION_CACHE_SECS", "soon")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "WARDEN_VALIDATION_CACHE_SECS",
                ..
            }
        ));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let err = load(&[("WARDEN_ACCESS_TOKEN_TTL_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { .. }));
    }

    #[test]
    fn zero_record_cache_disables_it() {
        let cfg = load(&[("WARDEN_RECORD_CACHE_SECS", "0")]).unwrap();
        assert!(!cfg.record_cache().unwrap().enabled());
        assert!(WardenConfig::default().record_cache().unwrap().enabled());
    }
}
