use std::time::Duration;

use anyhow::{Context, Result};
use fromenv::FromEnv;

/// Runtime settings for an [`Orm`](crate::Orm) handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrmConfig {
    /// Time-to-live applied to every object-cache write.
    pub cache_ttl: Duration,
    /// When false, the object cache is replaced by a store that keeps nothing.
    pub cache_enabled: bool,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(600),
            cache_enabled: true,
        }
    }
}

#[derive(Debug, Clone, FromEnv)]
pub struct ConfigOptions {
    #[env(from = "ORM_CACHE_TTL_SECS", default = "600")]
    cache_ttl_secs: String,
    #[env(from = "ORM_CACHE_ENABLED", default = "true")]
    cache_enabled: String,
}

impl ConfigOptions {
    fn parse(self) -> Result<OrmConfig> {
        let secs: u64 = self
            .cache_ttl_secs
            .trim()
            .parse()
            .with_context(|| format!("invalid ORM_CACHE_TTL_SECS: {:?}", self.cache_ttl_secs))?;
        let cache_enabled = parse_flag(&self.cache_enabled)
            .with_context(|| format!("invalid ORM_CACHE_ENABLED: {:?}", self.cache_enabled))?;

        Ok(OrmConfig {
            cache_ttl: Duration::from_secs(secs),
            cache_enabled,
        })
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

impl quarry_sql::FromEnv for OrmConfig {
    fn from_env() -> Result<Self> {
        ConfigOptions::from_env().finalize().context("issue loading orm configuration")?.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_options() {
        let config = ConfigOptions {
            cache_ttl_secs: " 30 ".to_string(),
            cache_enabled: "Off".to_string(),
        }
        .parse()
        .expect("valid options");

        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert!(!config.cache_enabled);
    }

    #[test]
    fn rejects_bad_values() {
        let err = ConfigOptions {
            cache_ttl_secs: "ten".to_string(),
            cache_enabled: "true".to_string(),
        }
        .parse()
        .expect_err("ttl is not a number");
        assert!(err.to_string().contains("ORM_CACHE_TTL_SECS"));

        parse_flag("maybe").expect_err("not a flag");
    }
}
