use std::collections::HashMap;

use serde::Deserialize;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::ApiError,
    schema::{Id, Ingredient, RecipePart},
};

use super::tags::{first_missing, group_by_recipe};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

/// Escapes `LIKE` metacharacters so user input only ever matches literally.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Case-insensitive name prefix search; no prefix lists the whole catalog.
pub async fn search_ingredients(
    prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, ApiError> {
    let prefix = prefix.map(str::trim).unwrap_or("");

    let rows: Vec<Ingredient> = sqlx::query_as(
        "
        SELECT * FROM ingredients
        WHERE LOWER(name) LIKE LOWER($1) || '%'
        ORDER BY name, id
    ",
    )
    .bind(escape_like(prefix))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, ApiError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn list_recipe_parts(
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipePart>, ApiError> {
    let mut parts = list_parts_for_recipes(&[recipe_id], pool).await?;

    Ok(parts.remove(&recipe_id).unwrap_or_default())
}

/// Ingredient lines of a whole page of recipes in one query, keyed by recipe.
pub async fn list_parts_for_recipes(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<RecipePart>>, ApiError> {
    let rows: Vec<RecipePart> = sqlx::query_as(
        "
        SELECT ri.recipe_id AS recipe_id, i.id AS ingredient_id, i.name AS name,
            i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await?;

    Ok(group_by_recipe(rows.into_iter().map(|part| (part.recipe_id, part))))
}

/// Bulk load of the catalog. Returns the number of inserted rows.
pub async fn insert_ingredients(
    ingredients: &[NewIngredient],
    pool: &Pool<Postgres>,
) -> Result<u64, ApiError> {
    let mut tr = pool.begin().await?;
    let mut inserted = 0;

    // Two binds per row, well under the 65535 parameter limit.
    for chunk in ingredients.chunks(1000) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");
        query_builder.push_values(chunk, |mut b, ingredient| {
            b.push_bind(ingredient.name.trim())
                .push_bind(ingredient.measurement_unit.trim());
        });

        inserted += query_builder
            .build()
            .execute(&mut *tr)
            .await?
            .rows_affected();
    }

    tr.commit().await?;
    Ok(inserted)
}

pub(crate) async fn ensure_ingredients_exist(
    conn: &mut PgConnection,
    ids: &[Id],
) -> Result<(), ApiError> {
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    match first_missing(ids, found.iter().map(|row| row.0)) {
        Some(id) => Err(ApiError::field(
            "ingredients",
            &format!("Invalid pk \"{id}\" - object does not exist."),
        )),
        None => Ok(()),
    }
}
