use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use warp::{
    http::StatusCode,
    reject::Reject,
    reply::{self, Reply, Response},
};

pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";

/// Business rules of the recipe payload, in the order they are checked.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeRule {
    #[error("A recipe needs at least one tag.")]
    EmptyTags,
    #[error("Recipe name must be at most {0} characters long.")]
    NameTooLong(usize),
    #[error("A recipe needs at least one ingredient.")]
    EmptyIngredients,
    #[error("Cooking time must be at least 1 minute.")]
    CookingTimeTooShort,
    #[error("Tags in a recipe must not repeat.")]
    DuplicateTags,
    #[error("Ingredients in a recipe must not repeat.")]
    DuplicateIngredients,
    #[error("This ingredient is already in the recipe.")]
    DuplicateIngredientInRecipe,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid fields: {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
    Validation(FieldErrors),

    #[error("{0}")]
    Rule(#[from] RecipeRule),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct Detail<'a> {
    detail: &'a str,
}

impl ApiError {
    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_owned(), vec![message.to_owned()]);
        Self::Validation(errors)
    }

    pub fn not_found() -> Self {
        Self::NotFound(String::from("Not found."))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::Rule(_)
            | ApiError::BadRequest(_)
            | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_response(&self) -> Response {
        let status = self.status();

        match self {
            ApiError::Validation(errors) => {
                reply::with_status(reply::json(errors), status).into_response()
            }
            ApiError::Internal(info) => {
                log::error!("> {info}");
                let body = Detail {
                    detail: "Internal server error",
                };
                reply::with_status(reply::json(&body), status).into_response()
            }
            other => {
                let message = other.to_string();
                let body = Detail { detail: &message };
                reply::with_status(reply::json(&body), status).into_response()
            }
        }
    }
}

impl Reject for ApiError {}

impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self::not_found(),
            sqlx::Error::Database(e) if e.is_unique_violation() => {
                Self::Conflict(String::from("Bad request: object already exists."))
            }
            sqlx::Error::Database(e) if e.is_foreign_key_violation() => {
                Self::BadRequest(String::from("Bad request: referenced object does not exist."))
            }
            sqlx::Error::Database(e) if e.is_check_violation() => {
                Self::BadRequest(String::from("Bad request: value out of range."))
            }
            sqlx::Error::Database(e) => Self::Internal(format!("{e}")),
            sqlx::Error::Configuration(e) => Self::Internal(format!("{e}")),
            sqlx::Error::Io(e) => Self::Internal(format!("{e}")),
            sqlx::Error::Tls(e) => Self::Internal(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::Internal(e),
            sqlx::Error::ColumnNotFound(e) => Self::Internal(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::Internal(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::Internal(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::Internal(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::Internal(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::Internal(String::from("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::Internal(format!("{e}")),
            e => Self::Internal(format!("{e}")),
        }
    }
}

#[derive(Debug)]
pub struct CacheError {
    info: String,
}

impl CacheError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for CacheError {}
