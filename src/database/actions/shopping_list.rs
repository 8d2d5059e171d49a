use serde::Serialize;
use sqlx::{FromRow, Pool, Postgres};

use crate::{error::ApiError, jwt::SessionData, permissions::ActionType, schema::Id};

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct ShoppingItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// One row per (name, unit) over every recipe in the cart.
const SHOPPING_LIST_QUERY: &str = "
    SELECT i.name AS name, i.measurement_unit AS measurement_unit,
        SUM(ri.amount)::BIGINT AS amount
    FROM shopping_carts s
    INNER JOIN recipe_ingredients ri ON ri.recipe_id = s.recipe_id
    INNER JOIN ingredients i ON i.id = ri.ingredient_id
    WHERE s.user_id = $1
    GROUP BY i.name, i.measurement_unit
    ORDER BY i.name, i.measurement_unit
";

pub async fn fetch_shopping_list(
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShoppingItem>, ApiError> {
    let items: Vec<ShoppingItem> = sqlx::query_as(SHOPPING_LIST_QUERY)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(items)
}

pub async fn build_shopping_list(
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShoppingItem>, ApiError> {
    session.authenticate(ActionType::ManageOwnMemberships)?;

    fetch_shopping_list(session.user_id, pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(query: &str) -> String {
        query.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn lines_are_summed_per_name_and_unit() {
        let query = normalized(SHOPPING_LIST_QUERY);

        assert!(query.contains("SUM(ri.amount)::BIGINT AS amount"));
        assert!(query.contains("GROUP BY i.name, i.measurement_unit"));
        assert!(query.ends_with("ORDER BY i.name, i.measurement_unit"));
    }

    #[test]
    fn only_the_requesters_cart_is_read() {
        let query = normalized(SHOPPING_LIST_QUERY);

        assert!(query.contains("FROM shopping_carts s"));
        assert!(query.contains("WHERE s.user_id = $1"));
    }
}
