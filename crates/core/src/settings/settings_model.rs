//! Engine configuration.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CHUNK_DAYS;
use crate::errors::{Error, Result};

pub const BATCH_MODE_KEY: &str = "SL_BATCH_MODE";
pub const CHUNK_DAYS_KEY: &str = "SL_CHUNK_DAYS";

/// Runtime switches for the snapshot engine and the import session.
///
/// Passed explicitly into the services that need it; there is no global copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    /// Use the relevance-filtered batch orchestrator. When false every request
    /// goes through the single-date processor.
    pub batch_mode_enabled: bool,
    /// Width of one import chunk in calendar days.
    pub chunk_days: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_mode_enabled: true,
            chunk_days: DEFAULT_CHUNK_DAYS,
        }
    }
}

impl EngineSettings {
    /// Reads `SL_BATCH_MODE` and `SL_CHUNK_DAYS` from the process environment,
    /// falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key-value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(raw) = lookup(BATCH_MODE_KEY) {
            settings.batch_mode_enabled = parse_bool(BATCH_MODE_KEY, &raw)?;
        }

        if let Some(raw) = lookup(CHUNK_DAYS_KEY) {
            let days: u32 = raw.trim().parse().map_err(|_| {
                Error::InvalidConfigValue(format!("{} must be a positive integer, got '{}'", CHUNK_DAYS_KEY, raw))
            })?;
            settings = settings.with_chunk_days(days)?;
        }

        debug!("Engine settings resolved: {:?}", settings);
        Ok(settings)
    }

    pub fn with_batch_mode(mut self, enabled: bool) -> Self {
        self.batch_mode_enabled = enabled;
        self
    }

    pub fn with_chunk_days(mut self, days: u32) -> Result<Self> {
        if days == 0 {
            return Err(Error::InvalidConfigValue(format!(
                "{} must be at least 1",
                CHUNK_DAYS_KEY
            )));
        }
        self.chunk_days = days;
        Ok(self)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfigValue(format!(
            "{} expects a boolean, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let settings = EngineSettings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert!(settings.batch_mode_enabled);
        assert_eq!(settings.chunk_days, DEFAULT_CHUNK_DAYS);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let settings = EngineSettings::from_lookup(lookup_from(&[
            (BATCH_MODE_KEY, "off"),
            (CHUNK_DAYS_KEY, " 7 "),
        ]))
        .unwrap();
        assert!(!settings.batch_mode_enabled);
        assert_eq!(settings.chunk_days, 7);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(EngineSettings::from_lookup(lookup_from(&[(BATCH_MODE_KEY, "maybe")])).is_err());
        assert!(EngineSettings::from_lookup(lookup_from(&[(CHUNK_DAYS_KEY, "0")])).is_err());
        assert!(EngineSettings::from_lookup(lookup_from(&[(CHUNK_DAYS_KEY, "-3")])).is_err());
    }
}
