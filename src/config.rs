// MIT License
// Copyright 2017--present xhal developers

//! Session defaults, overridable from the environment.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `XHAL_RPC_PORT` | TCP port of the board RPC service | `87` |
//! | `XHAL_LOG_LEVEL` | initial session log level (`error`..`trace` or `0`..`4`) | `info` |
//!
//! Unparseable values fall back to the default.

use crate::logging::LogLevel;

/// Port the board-side RPC service listens on.
pub const DEFAULT_RPC_PORT: u16 = 87;

pub const PORT_ENV: &str = "XHAL_RPC_PORT";
pub const LOG_LEVEL_ENV: &str = "XHAL_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XhalConfig {
    pub port: u16,
    pub log_level: LogLevel,
}

impl Default for XhalConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_RPC_PORT,
            log_level: LogLevel::Info,
        }
    }
}

impl XhalConfig {
    /// Defaults with `XHAL_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(port) = lookup(PORT_ENV).and_then(|p| p.trim().parse().ok()) {
            config.port = port;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).and_then(|l| parse_level(&l)) {
            config.log_level = level;
        }
        config
    }
}

fn parse_level(raw: &str) -> Option<LogLevel> {
    LogLevel::from_name(raw).or_else(|| {
        raw.trim()
            .parse::<i32>()
            .ok()
            .and_then(|n| LogLevel::try_from(n).ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = XhalConfig::from_lookup(lookup(&[]));
        assert_eq!(config, XhalConfig::default());
        assert_eq!(config.port, 87);
    }

    #[test]
    fn overrides_are_applied() {
        let config =
            XhalConfig::from_lookup(lookup(&[(PORT_ENV, "9087"), (LOG_LEVEL_ENV, "debug")]));
        assert_eq!(config.port, 9087);
        assert_eq!(config.log_level, LogLevel::Debug);

        let config = XhalConfig::from_lookup(lookup(&[(LOG_LEVEL_ENV, "4")]));
        assert_eq!(config.log_level, LogLevel::Trace);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config =
            XhalConfig::from_lookup(lookup(&[(PORT_ENV, "eighty"), (LOG_LEVEL_ENV, "9")]));
        assert_eq!(config, XhalConfig::default());
    }
}
