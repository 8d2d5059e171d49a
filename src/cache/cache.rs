use std::{fmt, future::Future};

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    constants::{CATALOG_CACHE_TTL_SECONDS, MAX_CACHED_SEARCH_LENGTH},
    error::{ApiError, CacheError},
    schema::Id,
};

/// Rotating this value drops every cached catalog entry at once.
pub const CATALOG_BIND_KEY: &str = "catalog-cache-key";

// Caching - keys

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheKey {
    TagList,
    Tag(Id),
    IngredientSearch(String),
    Ingredient(Id),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::TagList => write!(f, "tags"),
            CacheKey::Tag(id) => write!(f, "tag-{id}"),
            CacheKey::IngredientSearch(prefix) => {
                write!(f, "ingredient-search-{}", prefix.trim().to_lowercase())
            }
            CacheKey::Ingredient(id) => write!(f, "ingredient-{id}"),
        }
    }
}

impl CacheKey {
    /// Long search prefixes are rare repeats; they go straight to the database.
    pub fn is_cacheable(&self) -> bool {
        match self {
            CacheKey::IngredientSearch(prefix) => {
                prefix.trim().chars().count() <= MAX_CACHED_SEARCH_LENGTH
            }
            _ => true,
        }
    }
}

// Cache - wrappers

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone, Debug, PartialEq)]
pub struct RedisValue {
    pub value: serde_json::Value,
    bind: Option<String>,
}

impl RedisValue {
    fn new<T: Serialize>(value: &T, bind: Option<String>) -> Result<Self, CacheError> {
        let value = serde_json::to_value(value)
            .map_err(|e| CacheError::new(format!("Could not serialize value: {e}")))?;

        Ok(Self { value, bind })
    }

    fn is_bound_to(&self, bind: &Option<String>) -> bool {
        &self.bind == bind
    }
}

/// Read-through lookup. Without a connection, or when the cache misbehaves,
/// the callback result is served as is.
pub async fn get_or<T, F, Fut>(
    key: CacheKey,
    cache: Option<&MultiplexedConnection>,
    callback: F,
) -> Result<T, ApiError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let Some(cache) = cache.filter(|_| key.is_cacheable()) else {
        return callback().await;
    };
    let mut cache = cache.clone();
    let name = key.to_string();

    let bind = match get_cache_value::<&str, String>(CATALOG_BIND_KEY, &mut cache).await {
        Ok(bind) => bind,
        Err(e) => {
            log::error!("> Failed to read cache bind: {e}");
            return callback().await;
        }
    };

    if let Some(value) = lookup::<T>(&name, &bind, &mut cache).await {
        return Ok(value);
    }

    log::trace!("> Fetching {name}");
    let value = callback().await?;

    match RedisValue::new(&value, bind) {
        Ok(cached) => {
            if let Err(e) =
                set_expiring_cache_value(&name, cached, CATALOG_CACHE_TTL_SECONDS, &mut cache).await
            {
                log::error!("> Failed to cache {name}: {e}");
            }
        }
        Err(e) => log::error!("> {e}"),
    }

    Ok(value)
}

async fn lookup<T: DeserializeOwned>(
    name: &str,
    bind: &Option<String>,
    cache: &mut MultiplexedConnection,
) -> Option<T> {
    let cached = match get_cache_value::<&str, RedisValue>(name, cache).await {
        Ok(cached) => cached?,
        Err(_) => {
            discard(name, cache);
            return None;
        }
    };

    if !cached.is_bound_to(bind) {
        log::trace!("> Invalidated {name}");
        return None;
    }

    match serde_json::from_value(cached.value) {
        Ok(value) => {
            log::trace!("> Found {name}");
            Some(value)
        }
        Err(_) => {
            discard(name, cache);
            None
        }
    }
}

fn discard(name: &str, cache: &MultiplexedConnection) {
    let mut c = cache.clone();
    let k = name.to_owned();
    tokio::spawn(async move {
        log::error!("> Failed to deserialize cached value. Deleting {}", &k);
        if let Err(e) = delete_cache_value(k, &mut c).await {
            log::error!("> Failed to delete cached value! {e}");
        }
    });
}

/// Called after catalog loads.
pub async fn rotate_catalog_cache(cache: &mut MultiplexedConnection) -> Result<(), CacheError> {
    let bind = Uuid::new_v4().to_string();
    set_cache_value(CATALOG_BIND_KEY, &bind, cache).await?;
    log::info!("Rotated catalog cache key");

    Ok(())
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), CacheError> {
    let _: () = cache.set(key, value).await?;

    Ok(())
}

/// Catalog entries expire on their own; rotating the bind only hides them.
pub async fn set_expiring_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    seconds: u64,
    cache: &mut MultiplexedConnection,
) -> Result<(), CacheError> {
    let _: () = cache.set_ex(key, value, seconds).await?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), CacheError> {
    let _: () = cache.del(key).await?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, CacheError> {
    let value: Option<V> = cache.get(key).await?;

    Ok(value)
}
