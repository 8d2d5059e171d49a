use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use sqlx::{Pool, Postgres};

use crate::{config::Config, error::ApiError, form::RecipeLimits, jwt::SessionKey};

/// Everything a request handler needs, cloned into each route.
#[derive(Clone)]
pub struct State {
    pub pool: Pool<Postgres>,
    pub cache: Option<MultiplexedConnection>,
    pub config: Arc<Config>,
    pub session_key: SessionKey,
}

impl State {
    pub fn new(
        pool: Pool<Postgres>,
        cache: Option<MultiplexedConnection>,
        config: Config,
    ) -> Result<Self, ApiError> {
        let session_key = SessionKey::new(config.jwt_secret.as_bytes(), config.token_lifetime_hours)?;

        Ok(Self {
            pool,
            cache,
            config: Arc::new(config),
            session_key,
        })
    }

    pub fn recipe_limits(&self) -> RecipeLimits {
        RecipeLimits {
            name_max_length: self.config.recipe_name_max_length,
        }
    }
}
