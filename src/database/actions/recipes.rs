use std::path::Path;

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::{ApiError, FieldErrors, RecipeRule},
    form::{push_error, IngredientAmount, NewRecipe, RecipeChanges},
    jwt::SessionData,
    media::{remove_image, store_image},
    pagination::{Page, PageQuery, QueryPairs},
    permissions::ActionType,
    schema::{Id, Recipe, RecipeRow},
};

use super::{
    ingredients::ensure_ingredients_exist,
    tags::{ensure_tags_exist, is_valid_slug},
};

pub const RECIPES_PATH: &str = "/recipes/";

/// Listing filters of `GET /recipes/`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "True" => Some(true),
        "0" | "false" | "False" => Some(false),
        _ => None,
    }
}

impl RecipeFilter {
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ApiError> {
        let mut filter = Self::default();
        let mut errors = FieldErrors::new();

        for (key, value) in pairs {
            match key.as_str() {
                "author" => match value.parse::<Id>() {
                    Ok(id) => filter.author = Some(id),
                    Err(_) => push_error(&mut errors, "author", "A valid integer is required."),
                },
                "tags" => {
                    if is_valid_slug(value) {
                        filter.tags.push(value.to_owned());
                    } else {
                        push_error(
                            &mut errors,
                            "tags",
                            &format!("Select a valid choice. {value} is not one of the available choices."),
                        );
                    }
                }
                "is_favorited" | "is_in_shopping_cart" => match parse_flag(value) {
                    Some(flag) if key == "is_favorited" => filter.is_favorited = flag,
                    Some(flag) => filter.is_in_shopping_cart = flag,
                    None => push_error(&mut errors, key, "Must be a valid boolean."),
                },
                _ => {}
            }
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        Ok(filter)
    }

    /// The filter as query pairs, so pagination links keep it.
    pub fn to_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        if let Some(author) = self.author {
            pairs.push(("author".into(), author.to_string()));
        }
        for slug in &self.tags {
            pairs.push(("tags".into(), slug.to_owned()));
        }
        if self.is_favorited {
            pairs.push(("is_favorited".into(), "1".into()));
        }
        if self.is_in_shopping_cart {
            pairs.push(("is_in_shopping_cart".into(), "1".into()));
        }
        pairs
    }
}

/// Newest first. Membership filters only apply to an identified requester.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    requester: Option<Id>,
    query: PageQuery,
    pool: &Pool<Postgres>,
) -> Result<Page<Recipe>, ApiError> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        query_builder.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query_builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }
    if let Some(user_id) = requester {
        if filter.is_favorited {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            query_builder
                .push(
                    " AND EXISTS (SELECT 1 FROM shopping_carts s WHERE s.recipe_id = r.id AND s.user_id = ",
                )
                .push_bind(user_id)
                .push(")");
        }
    }

    query_builder
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset());

    let rows: Vec<RecipeRow> = query_builder.build_query_as().fetch_all(pool).await?;
    let total_rows = rows.first().map(|row| row.count).unwrap_or(0);

    Page::from_rows(
        rows.into_iter().map(Recipe::from).collect(),
        total_rows,
        query,
        RECIPES_PATH,
        &filter.to_pairs(),
    )
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, ApiError> {
    let recipe: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(recipe)
}

/// An author's recipes, newest first, optionally capped.
pub async fn list_author_recipes(
    author_id: Id,
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Recipe>, ApiError> {
    let recipes: Vec<Recipe> = sqlx::query_as(
        "
        SELECT * FROM recipes
        WHERE author_id = $1
        ORDER BY pub_date DESC, id DESC
        LIMIT $2
    ",
    )
    .bind(author_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(recipes)
}

pub async fn count_author_recipes(author_id: Id, pool: &Pool<Postgres>) -> Result<i64, ApiError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Fetches a recipe the session is allowed to change: its own, or any for admins.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let recipe = get_recipe(id, pool).await?.ok_or_else(ApiError::not_found)?;

    match session.authenticate(ActionType::ManageAllRecipes) {
        Ok(_) => Ok(recipe),
        Err(_) if recipe.author_id == session.user_id => Ok(recipe),
        Err(e) => Err(e),
    }
}

/// Creates the recipe with its tags and ingredient lines as one unit.
pub async fn create_recipe(
    session: &SessionData,
    recipe: NewRecipe,
    media_root: &Path,
    pool: &Pool<Postgres>,
) -> Result<Id, ApiError> {
    session.authenticate(ActionType::CreateRecipes)?;

    let image = match &recipe.image {
        Some(image) => Some(store_image(media_root, image).await?),
        None => None,
    };

    let result = insert_recipe(session.user_id, &recipe, image.as_deref(), pool).await;
    if result.is_err() {
        if let Some(path) = &image {
            remove_image(media_root, path).await;
        }
    }

    result
}

async fn insert_recipe(
    author_id: Id,
    recipe: &NewRecipe,
    image: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Id, ApiError> {
    let mut tr = pool.begin().await?;

    ensure_tags_exist(&mut tr, &recipe.tags).await?;
    ensure_ingredients_exist(&mut tr, &recipe.ingredients.iter().map(|i| i.id).collect::<Vec<_>>())
        .await?;

    let (id,): (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, image, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(image)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tr)
    .await?;

    insert_recipe_parts(id, &recipe.ingredients, &mut tr).await?;
    insert_recipe_tags(id, &recipe.tags, &mut tr).await?;

    tr.commit().await?;
    log::trace!("> Created recipe {id}");

    Ok(id)
}

async fn insert_recipe_parts(
    recipe_id: Id,
    ingredients: &[IngredientAmount],
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    if ingredients.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    query_builder.push_values(ingredients, |mut b, line| {
        b.push_bind(recipe_id)
            .push_bind(line.id)
            .push_bind(line.amount);
    });

    query_builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::Rule(RecipeRule::DuplicateIngredientInRecipe)
            }
            e => e.into(),
        })?;

    Ok(())
}

async fn insert_recipe_tags(
    recipe_id: Id,
    tags: &[Id],
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    if tags.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    query_builder.push_values(tags, |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(*tag_id);
    });

    query_builder.build().execute(&mut *conn).await?;

    Ok(())
}

/// Applies a PATCH. Collections absent from `changes` are left alone.
pub async fn update_recipe(
    recipe: &Recipe,
    changes: RecipeChanges,
    media_root: &Path,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let new_image = match &changes.image {
        Some(Some(image)) => Some(store_image(media_root, image).await?),
        _ => None,
    };

    match apply_changes(recipe.id, &changes, new_image.as_deref(), pool).await {
        Ok(()) => {
            if changes.image.is_some() {
                if let Some(old) = &recipe.image {
                    remove_image(media_root, old).await;
                }
            }
            Ok(())
        }
        Err(e) => {
            if let Some(path) = &new_image {
                remove_image(media_root, path).await;
            }
            Err(e)
        }
    }
}

async fn apply_changes(
    id: Id,
    changes: &RecipeChanges,
    image: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let mut tr = pool.begin().await?;

    let _: (Id,) = sqlx::query_as("SELECT id FROM recipes WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_one(&mut *tr)
        .await?;

    if changes.touches_scalars() {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE recipes SET ");
        {
            let mut set = query_builder.separated(", ");
            if let Some(name) = &changes.name {
                set.push("name = ").push_bind_unseparated(name.to_owned());
            }
            if let Some(text) = &changes.text {
                set.push("text = ").push_bind_unseparated(text.to_owned());
            }
            if let Some(cooking_time) = changes.cooking_time {
                set.push("cooking_time = ").push_bind_unseparated(cooking_time);
            }
            if changes.image.is_some() {
                set.push("image = ")
                    .push_bind_unseparated(image.map(str::to_owned));
            }
        }
        query_builder.push(" WHERE id = ").push_bind(id);
        query_builder.build().execute(&mut *tr).await?;
    }

    if let Some(tags) = &changes.tags {
        ensure_tags_exist(&mut tr, tags).await?;
        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tr)
            .await?;
        insert_recipe_tags(id, tags, &mut tr).await?;
    }

    if let Some(ingredients) = &changes.ingredients {
        ensure_ingredients_exist(&mut tr, &ingredients.iter().map(|i| i.id).collect::<Vec<_>>())
            .await?;
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tr)
            .await?;
        insert_recipe_parts(id, ingredients, &mut tr).await?;
    }

    tr.commit().await?;
    log::trace!("> Updated recipe {id}");

    Ok(())
}

/// Dependent rows go with the recipe through the foreign keys.
pub async fn delete_recipe(
    recipe: &Recipe,
    media_root: &Path,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe.id)
        .execute(pool)
        .await?;

    if let Some(image) = &recipe.image {
        remove_image(media_root, image).await;
    }

    Ok(())
}
