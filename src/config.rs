use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use thiserror::Error;

use crate::constants::{RECIPE_COUNT_PER_PAGE, RECIPE_NAME_MAX_LENGTH};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid {key} value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub token_lifetime_hours: i64,
    pub media_root: PathBuf,
    pub media_url: String,
    pub recipe_name_max_length: usize,
    pub page_size: i64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            env::var(key)
                .ok()
                .or_else(|| read_secret(key))
        })
    }

    /// Builds the configuration from any key lookup, the environment in production.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            port: try_load(&lookup, "FOODGRAM_PORT", "8000")?,
            database_url: required(&lookup, "DATABASE_URL")?,
            database_max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "5")?,
            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            jwt_secret: required(&lookup, "JWT_SECRET")?,
            token_lifetime_hours: try_load(&lookup, "TOKEN_LIFETIME_HOURS", "24")?,
            media_root: try_load(&lookup, "MEDIA_ROOT", "media")?,
            media_url: try_load(&lookup, "MEDIA_URL", "/media/")?,
            recipe_name_max_length: try_load(
                &lookup,
                "RECIPE_NAME_MAX_LENGTH",
                &RECIPE_NAME_MAX_LENGTH.to_string(),
            )?,
            page_size: try_load(&lookup, "PAGE_SIZE", &RECIPE_COUNT_PER_PAGE.to_string())?,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        log::info!("{key} not set, using default: {default}");
        default.to_string()
    });

    let parsed = value.trim().parse::<T>();
    match parsed {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(path).ok().map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use maplit::hashmap;

    use super::*;

    fn config(vars: HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_fill_the_gaps() {
        let config = config(hashmap! {
            "DATABASE_URL" => "postgres://localhost/foodgram",
            "JWT_SECRET" => "secret",
        })
        .unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.redis_url, None);
        assert_eq!(config.token_lifetime_hours, 24);
        assert_eq!(config.media_root, PathBuf::from("media"));
        assert_eq!(config.media_url, "/media/");
        assert_eq!(config.recipe_name_max_length, 200);
        assert_eq!(config.page_size, 6);
    }

    #[test]
    fn explicit_values_win() {
        let config = config(hashmap! {
            "DATABASE_URL" => "postgres://db/foodgram",
            "JWT_SECRET" => "secret",
            "FOODGRAM_PORT" => "9000",
            "REDIS_URL" => "redis://cache:6379",
            "RECIPE_NAME_MAX_LENGTH" => "64",
        })
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.recipe_name_max_length, 64);
    }

    #[test]
    fn required_values_are_reported() {
        assert_eq!(
            config(hashmap! { "JWT_SECRET" => "secret" }).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
        assert_eq!(
            config(hashmap! { "DATABASE_URL" => "postgres://db", "JWT_SECRET" => " " })
                .unwrap_err(),
            ConfigError::Missing("JWT_SECRET")
        );
    }

    #[test]
    fn garbage_is_rejected() {
        let error = config(hashmap! {
            "DATABASE_URL" => "postgres://db",
            "JWT_SECRET" => "secret",
            "FOODGRAM_PORT" => "eighty",
        })
        .unwrap_err();

        assert!(matches!(error, ConfigError::Invalid { key: "FOODGRAM_PORT", .. }));
    }
}
