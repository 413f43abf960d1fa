use std::env;

use crate::errors::{ConfigError, ReachError};

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Configuration shared across the Reach services.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Postgres connection string. When absent the services fall back to the
    /// in-memory store.
    pub database_url: Option<String>,
    pub environment: Environment,
    pub service_name: String,
    pub http_bind: Option<String>,
}

impl CoreConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix("REACH_").map(|mut config| {
            if config.database_url.is_none() {
                config.database_url = non_empty_var("DATABASE_URL");
            }
            config
        })
    }

    /// Loads configuration from env vars prefixed with the provided value (e.g. `REACH_`).
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let database_url = non_empty_var(&key("DATABASE_URL"));

        let environment = env::var(key("ENV"))
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();

        let service_name =
            non_empty_var(&key("SERVICE_NAME")).unwrap_or_else(|| "reach-gateway".to_string());

        let http_bind = non_empty_var(&key("HTTP_BIND"));

        if let Some(url) = &database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(ConfigError::InvalidValue {
                    key: "DATABASE_URL",
                    message: "expected a postgres:// connection string".into(),
                });
            }
        }

        Ok(Self {
            database_url,
            environment,
            service_name,
            http_bind,
        })
    }

    /// Returns the Postgres URL if one was configured.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    /// Whether the service is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Helper that loads config and converts to the canonical Reach error type.
pub fn load_core_config() -> Result<CoreConfig, ReachError> {
    Ok(CoreConfig::from_env()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_for_unknown_prefix() {
        let cfg = CoreConfig::from_env_with_prefix("REACH_TEST_DEFAULTS_").expect("config");
        assert_eq!(cfg.environment, Environment::Development);
        assert!(cfg.database_url().is_none());
        assert_eq!(cfg.service_name, "reach-gateway");
    }

    #[test]
    fn rejects_non_postgres_urls() {
        std::env::set_var("REACH_TEST_BADURL_DATABASE_URL", "mysql://localhost/crm");
        let err = CoreConfig::from_env_with_prefix("REACH_TEST_BADURL_").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        std::env::remove_var("REACH_TEST_BADURL_DATABASE_URL");
    }

    #[test]
    fn parses_production_environment() {
        std::env::set_var("REACH_TEST_PROD_ENV", "prod");
        let cfg = CoreConfig::from_env_with_prefix("REACH_TEST_PROD_").expect("config");
        assert!(cfg.is_production());
        std::env::remove_var("REACH_TEST_PROD_ENV");
    }
}
