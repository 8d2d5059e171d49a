use sqlx::{Pool, Postgres};

use crate::{
    error::ApiError,
    jwt::SessionData,
    permissions::ActionType,
    schema::{Id, Recipe},
};

use super::recipes::get_recipe;

/// A (user, recipe) pair list a user can toggle recipes in and out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Favorite,
    ShoppingCart,
}

impl Membership {
    fn table(self) -> &'static str {
        match self {
            Membership::Favorite => "favorites",
            Membership::ShoppingCart => "shopping_carts",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Membership::Favorite => "favorites",
            Membership::ShoppingCart => "shopping cart",
        }
    }
}

pub async fn is_member(
    membership: Membership,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    let query = format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND recipe_id = $2)",
        membership.table()
    );
    let (exists,): (bool,) = sqlx::query_as(&query)
        .bind(user_id)
        .bind(recipe_id)
        .fetch_one(pool)
        .await?;

    Ok(exists)
}

/// Always `false` for anonymous requesters.
pub async fn is_favorited(
    requester: Option<Id>,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    match requester {
        Some(user_id) => is_member(Membership::Favorite, user_id, recipe_id, pool).await,
        None => Ok(false),
    }
}

/// Always `false` for anonymous requesters.
pub async fn is_in_shopping_cart(
    requester: Option<Id>,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    match requester {
        Some(user_id) => is_member(Membership::ShoppingCart, user_id, recipe_id, pool).await,
        None => Ok(false),
    }
}

pub async fn count_members(
    membership: Membership,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<i64, ApiError> {
    let query = format!(
        "SELECT COUNT(*) FROM {} WHERE recipe_id = $1",
        membership.table()
    );
    let (count,): (i64,) = sqlx::query_as(&query)
        .bind(recipe_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Adds the recipe. A missing recipe is a bad request here, not a 404.
pub async fn add_membership(
    membership: Membership,
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    session.authenticate(ActionType::ManageOwnMemberships)?;

    let recipe = get_recipe(recipe_id, pool).await?.ok_or_else(|| {
        ApiError::BadRequest(String::from("Recipe does not exist."))
    })?;

    let query = format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        membership.table()
    );
    let result = sqlx::query(&query)
        .bind(session.user_id)
        .bind(recipe_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict(format!(
            "Recipe is already in {}.",
            membership.label()
        )));
    }

    Ok(recipe)
}

pub async fn remove_membership(
    membership: Membership,
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    session.authenticate(ActionType::ManageOwnMemberships)?;

    if get_recipe(recipe_id, pool).await?.is_none() {
        return Err(ApiError::not_found());
    }

    let query = format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        membership.table()
    );
    let result = sqlx::query(&query)
        .bind(session.user_id)
        .bind(recipe_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!(
            "Recipe is not in {}.",
            membership.label()
        )));
    }

    Ok(())
}
