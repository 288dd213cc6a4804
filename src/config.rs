use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const APP_NAME: &str = "ledgerlens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn default_log_filter() -> &'static str {
    "info"
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub paperless_base_url: String,
    pub paperless_token: String,
    pub database_path: PathBuf,
    pub polling_interval: Duration,
    pub tag_sync_interval: Duration,
    pub recheck_interval: Duration,
    /// Page size for paginated remote listings.
    pub batch_size: usize,
    pub balance_tolerance: f64,
    pub balance_warning_threshold: f64,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub pass_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            paperless_base_url: "http://paperless-web:8000".to_string(),
            paperless_token: String::new(),
            database_path: PathBuf::from("data/anomaly_detector.db"),
            polling_interval: Duration::from_secs(300),
            tag_sync_interval: Duration::from_secs(6 * 3600),
            recheck_interval: Duration::from_secs(3600),
            batch_size: 100,
            balance_tolerance: 0.01,
            balance_warning_threshold: 1.00,
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            pass_timeout: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(url) = env_string("PAPERLESS_API_BASE_URL") {
            settings.paperless_base_url = url.trim_end_matches('/').to_string();
        }
        match env_string("PAPERLESS_API_TOKEN") {
            Some(token) => settings.paperless_token = token,
            None => bail!("PAPERLESS_API_TOKEN must be set"),
        }
        if let Some(path) = env_string("DATABASE_PATH") {
            settings.database_path = PathBuf::from(path);
        }

        settings.polling_interval =
            Duration::from_secs(env_parse("POLLING_INTERVAL_SECS")?.unwrap_or(300));
        settings.tag_sync_interval =
            Duration::from_secs(env_parse("TAG_SYNC_INTERVAL_SECS")?.unwrap_or(6 * 3600));
        settings.recheck_interval =
            Duration::from_secs(env_parse("RECHECK_INTERVAL_SECS")?.unwrap_or(3600));
        settings.batch_size = env_parse("BATCH_SIZE")?.unwrap_or(100);
        settings.balance_tolerance = env_parse("BALANCE_TOLERANCE")?.unwrap_or(0.01);
        settings.balance_warning_threshold =
            env_parse("BALANCE_WARNING_THRESHOLD")?.unwrap_or(1.00);
        settings.max_retries = env_parse("MAX_RETRIES")?.unwrap_or(3);
        settings.retry_backoff =
            Duration::from_millis(env_parse("RETRY_BACKOFF_MS")?.unwrap_or(500));
        settings.pass_timeout = env_parse("PASS_TIMEOUT_SECS")?.map(Duration::from_secs);

        Ok(settings)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_string(key) {
        Some(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {}: {:?}", key, raw))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.balance_tolerance, 0.01);
        assert_eq!(s.balance_warning_threshold, 1.00);
        assert_eq!(s.polling_interval, Duration::from_secs(300));
        assert_eq!(s.batch_size, 100);
        assert!(s.pass_timeout.is_none());
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
