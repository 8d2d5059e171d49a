use sqlx::{Pool, Postgres};

use crate::{
    error::ApiError,
    jwt::SessionData,
    pagination::{Page, PageQuery},
    permissions::ActionType,
    schema::{Id, UserProfile, UserRow},
};

use super::users::get_profile;

pub const SUBSCRIPTIONS_PATH: &str = "/users/subscriptions/";

/// Always `false` for anonymous requesters.
pub async fn is_subscribed(
    requester: Option<Id>,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    let Some(user_id) = requester else {
        return Ok(false);
    };

    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE user_id = $1 AND author_id = $2)",
    )
    .bind(user_id)
    .bind(author_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

pub async fn subscribe(
    author_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, ApiError> {
    session.authenticate(ActionType::ManageOwnMemberships)?;
    let author = get_profile(author_id, pool).await?;

    if author.id == session.user_id {
        return Err(ApiError::BadRequest(String::from(
            "You cannot subscribe to yourself.",
        )));
    }

    let result = sqlx::query(
        "INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict(String::from(
            "You are already subscribed to this author.",
        )));
    }

    Ok(author)
}

pub async fn unsubscribe(
    author_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    session.authenticate(ActionType::ManageOwnMemberships)?;
    get_profile(author_id, pool).await?;

    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(String::from(
            "You are not subscribed to this author.",
        )));
    }

    Ok(())
}

/// Authors the session follows, in the order they were followed.
pub async fn fetch_subscriptions(
    session: &SessionData,
    query: PageQuery,
    pool: &Pool<Postgres>,
) -> Result<Page<UserProfile>, ApiError> {
    session.authenticate(ActionType::ManageOwnMemberships)?;

    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name, COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY s.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(query.limit)
    .bind(query.offset())
    .fetch_all(pool)
    .await?;

    let total_rows = rows.first().map(|row| row.count).unwrap_or(0);
    Page::from_rows(
        rows.into_iter().map(UserProfile::from).collect(),
        total_rows,
        query,
        SUBSCRIPTIONS_PATH,
        &[],
    )
}
