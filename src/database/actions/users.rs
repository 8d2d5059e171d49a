use sqlx::{Pool, Postgres};

use crate::{
    cryptography::{hash_password_blocking, verify_password_blocking},
    error::ApiError,
    form::{LoginForm, RegistrationForm},
    jwt::{generate_jwt_session, SessionKey},
    pagination::{Page, PageQuery},
    schema::{Id, User, UserProfile, UserRow},
};

pub const USERS_PATH: &str = "/users/";

pub async fn get_user(email: &str, pool: &Pool<Postgres>) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_by_id(id: Id, pool: &Pool<Postgres>) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_profile(id: Id, pool: &Pool<Postgres>) -> Result<UserProfile, ApiError> {
    get_user_by_id(id, pool)
        .await?
        .map(UserProfile::from)
        .ok_or_else(ApiError::not_found)
}

pub async fn register_user(
    form: RegistrationForm,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, ApiError> {
    form.validate()?;
    let password = hash_password_blocking(form.password).await?;

    let user: Option<User> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING *
    ",
    )
    .bind(form.email.trim())
    .bind(form.username.trim())
    .bind(form.first_name.trim())
    .bind(form.last_name.trim())
    .bind(password)
    .fetch_optional(pool)
    .await?;

    match user {
        Some(user) => {
            log::info!("Registered user {}", user.id);
            Ok(user.into())
        }
        None => Err(ApiError::Conflict(String::from(
            "A user with that email or username already exists.",
        ))),
    }
}

/// Exchanges credentials for a signed session token.
pub async fn login_user(
    form: LoginForm,
    key: &SessionKey,
    pool: &Pool<Postgres>,
) -> Result<String, ApiError> {
    let invalid = || ApiError::BadRequest(String::from("Unable to log in with provided credentials."));

    let user = get_user(&form.email, pool).await?.ok_or_else(invalid)?;
    let authenticated = verify_password_blocking(form.password, user.password.to_owned()).await?;
    if !authenticated {
        return Err(invalid());
    }

    generate_jwt_session(&user, key)
}

pub async fn fetch_users(
    query: PageQuery,
    pool: &Pool<Postgres>,
) -> Result<Page<UserProfile>, ApiError> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT id, email, username, first_name, last_name, COUNT(*) OVER() AS count
        FROM users
        ORDER BY id
        LIMIT $1 OFFSET $2
    ",
    )
    .bind(query.limit)
    .bind(query.offset())
    .fetch_all(pool)
    .await?;

    let total_rows = rows.first().map(|row| row.count).unwrap_or(0);
    Page::from_rows(
        rows.into_iter().map(UserProfile::from).collect(),
        total_rows,
        query,
        USERS_PATH,
        &[],
    )
}
