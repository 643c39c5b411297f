use snapledger_core::settings::EngineSettings;

pub const DB_PATH_KEY: &str = "SL_DB_PATH";
pub const LOG_FORMAT_KEY: &str = "SL_LOG_FORMAT";

const DEFAULT_DB_PATH: &str = "./data/snapledger.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub log_format: String,
    pub engine: EngineSettings,
}

impl Config {
    /// Loads `.env` if present, then reads `SL_*` variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup(DB_PATH_KEY).unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let log_format = lookup(LOG_FORMAT_KEY).unwrap_or_else(|| "text".to_string());
        let engine = EngineSettings::from_lookup(&lookup)?;
        Ok(Self {
            db_path,
            log_format,
            engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapledger_core::settings::{BATCH_MODE_KEY, CHUNK_DAYS_KEY};

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert_eq!(config.log_format, "text");
        assert_eq!(config.engine, EngineSettings::default());
    }

    #[test]
    fn test_engine_keys_flow_through() {
        let config = Config::from_lookup(|key| match key {
            DB_PATH_KEY => Some("/var/lib/sl.db".to_string()),
            BATCH_MODE_KEY => Some("false".to_string()),
            CHUNK_DAYS_KEY => Some("14".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.db_path, "/var/lib/sl.db");
        assert!(!config.engine.batch_mode_enabled);
        assert_eq!(config.engine.chunk_days, 14);
    }

    #[test]
    fn test_bad_engine_value_is_an_error() {
        assert!(Config::from_lookup(|key| (key == CHUNK_DAYS_KEY).then(|| "0".to_string())).is_err());
    }
}
