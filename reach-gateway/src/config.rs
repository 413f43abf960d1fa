use std::env;
use std::str::FromStr;

use reach_core::config::CoreConfig;
use reach_core::errors::ConfigError;
use reach_rules::{TranslationMode, DEFAULT_SAMPLE_SIZE};
use reach_synth::{GeminiConfig, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use url::Url;

/// Credentials and endpoint for the generative model behind `/api/ai/*`.
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiSettings {
    fn maybe_from_env() -> Result<Option<Self>, ConfigError> {
        let Some(api_key) = non_empty_var("GEMINI_API_KEY")? else {
            return Ok(None);
        };
        let model = non_empty_var("GEMINI_MODEL")?.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into());
        let base_url = match non_empty_var("GEMINI_BASE_URL")? {
            Some(value) => sanitize_http_url("GEMINI_BASE_URL", &value)?,
            None => DEFAULT_GEMINI_BASE_URL.to_string(),
        };
        Ok(Some(Self {
            api_key,
            model,
            base_url,
        }))
    }

    pub fn client_config(&self) -> GeminiConfig {
        GeminiConfig::new(self.api_key.clone())
            .with_model(self.model.clone())
            .with_base_url(self.base_url.clone())
    }
}

/// Gateway configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_address: String,
    pub database_url: Option<String>,
    pub gemini: Option<GeminiSettings>,
    pub sample_size: usize,
    pub translation_mode: TranslationMode,
    pub ai_rate_limit_per_minute: u64,
    pub allowed_origins: Vec<String>,
    pub seed_demo: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            database_url: None,
            gemini: None,
            sample_size: DEFAULT_SAMPLE_SIZE,
            translation_mode: TranslationMode::default(),
            ai_rate_limit_per_minute: 30,
            allowed_origins: vec!["*".to_string()],
            seed_demo: true,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let core = CoreConfig::from_env()?;

        let bind_address = core
            .http_bind
            .clone()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let gemini = GeminiSettings::maybe_from_env()?;

        let sample_size = parse_env::<usize>("REACH_SAMPLE_SIZE", DEFAULT_SAMPLE_SIZE)?;
        let translation_mode =
            parse_env::<TranslationMode>("REACH_TRANSLATION_MODE", TranslationMode::default())?;
        let ai_rate_limit_per_minute = parse_env::<u64>("REACH_AI_RATE_LIMIT_PER_MINUTE", 30)?;
        let seed_demo = parse_env::<u64>("REACH_SEED_DEMO", 1)? != 0;

        let allowed_origins = non_empty_var("REACH_ALLOWED_ORIGINS")?
            .map(|value| split_list(&value))
            .unwrap_or_else(|| vec!["*".to_string()]);

        Ok(Self {
            bind_address,
            database_url: core.database_url,
            gemini,
            sample_size,
            translation_mode,
            ai_rate_limit_per_minute,
            allowed_origins,
            seed_demo,
        })
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn ai_enabled(&self) -> bool {
        self.gemini.is_some()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty_var(key: &'static str) -> Result<Option<String>, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(ConfigError::InvalidEnvVar { key, source: err }),
    }
}

fn sanitize_http_url(key: &'static str, value: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(value).map_err(|err| ConfigError::InvalidValue {
        key,
        message: err.to_string(),
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidValue {
            key,
            message: "expected an http or https url".into(),
        });
    }

    Ok(value.to_string())
}

fn parse_env<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(default)
            } else {
                T::from_str(trimmed).map_err(|err| ConfigError::InvalidValue {
                    key,
                    message: err.to_string(),
                })
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(ConfigError::InvalidEnvVar { key, source: err }),
    }
}
