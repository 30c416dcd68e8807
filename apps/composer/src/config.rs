use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::composition::composer::ComposerSettings;
use crate::composition::image_generator::ImageSettings;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or unparsable.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    /// Overrides the default text model.
    pub anthropic_model: Option<String>,
    pub port: u16,
    pub rust_log: String,
    /// Optional JSON catalog replacing the built-in one.
    pub pattern_catalog_path: Option<PathBuf>,
    pub image_service_url: Option<String>,
    pub image_service_key: Option<String>,
    pub compose_concurrency: usize,
    pub image_concurrency: usize,
    pub image_batch_size: usize,
    pub llm_timeout_secs: u64,
    pub image_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            anthropic_model: optional_env("ANTHROPIC_MODEL"),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            pattern_catalog_path: optional_env("PATTERN_CATALOG_PATH").map(PathBuf::from),
            image_service_url: optional_env("IMAGE_SERVICE_URL"),
            image_service_key: optional_env("IMAGE_SERVICE_KEY"),
            compose_concurrency: parse_positive("COMPOSE_CONCURRENCY", 4)?,
            image_concurrency: parse_positive("IMAGE_CONCURRENCY", 3)?,
            image_batch_size: parse_positive("IMAGE_BATCH_SIZE", 6)?,
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", 60)?,
            image_timeout_secs: parse_env("IMAGE_TIMEOUT_SECS", 90)?,
        })
    }

    pub fn composer_settings(&self) -> ComposerSettings {
        ComposerSettings {
            concurrency: self.compose_concurrency,
            llm_timeout: Duration::from_secs(self.llm_timeout_secs),
            images: ImageSettings {
                concurrency: self.image_concurrency,
                batch_size: self.image_batch_size,
                timeout: Duration::from_secs(self.image_timeout_secs),
            },
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank values are both treated as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

fn parse_positive(key: &str, default: usize) -> Result<usize> {
    let value = parse_env(key, default)?;
    anyhow::ensure!(value > 0, "{key} must be greater than zero");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keys below are unique to these tests so parallel test threads don't collide.

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        assert_eq!(parse_env::<usize>("COMPOSER_TEST_UNSET_KEY", 7).unwrap(), 7);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("COMPOSER_TEST_GARBAGE", "lots");
        let err = parse_env::<u16>("COMPOSER_TEST_GARBAGE", 1).unwrap_err();
        assert!(err.to_string().contains("COMPOSER_TEST_GARBAGE"));
    }

    #[test]
    fn test_parse_positive_rejects_zero() {
        std::env::set_var("COMPOSER_TEST_ZERO", "0");
        assert!(parse_positive("COMPOSER_TEST_ZERO", 3).is_err());
    }

    #[test]
    fn test_blank_optional_is_absent() {
        std::env::set_var("COMPOSER_TEST_BLANK", "   ");
        assert_eq!(optional_env("COMPOSER_TEST_BLANK"), None);
    }

    #[test]
    fn test_composer_settings_maps_durations() {
        let config = Config {
            anthropic_api_key: "key".to_string(),
            anthropic_model: None,
            port: 8080,
            rust_log: "info".to_string(),
            pattern_catalog_path: None,
            image_service_url: None,
            image_service_key: None,
            compose_concurrency: 4,
            image_concurrency: 3,
            image_batch_size: 6,
            llm_timeout_secs: 60,
            image_timeout_secs: 90,
        };
        let settings = config.composer_settings();
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.llm_timeout, Duration::from_secs(60));
        assert_eq!(settings.images.batch_size, 6);
        assert_eq!(settings.images.timeout, Duration::from_secs(90));
    }
}
