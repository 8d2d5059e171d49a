use crate::{
    constants::{TAG_COLOR_MAX_LENGTH, TAG_NAME_MAX_LENGTH, TAG_SLUG_MAX_LENGTH},
    error::ApiError,
    schema::{Id, Tag},
};

use std::collections::{HashMap, HashSet};

use sqlx::{FromRow, PgConnection, Pool, Postgres, QueryBuilder};

/// Slugs follow `[-a-zA-Z0-9_]+`.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= TAG_SLUG_MAX_LENGTH
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// `#RRGGBB`
pub fn is_valid_color(color: &str) -> bool {
    color.len() == TAG_COLOR_MAX_LENGTH
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(list)
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, ApiError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(tag)
}

pub async fn list_recipe_tags(recipe_id: Id, pool: &Pool<Postgres>) -> Result<Vec<Tag>, ApiError> {
    let mut tags = list_tags_for_recipes(&[recipe_id], pool).await?;

    Ok(tags.remove(&recipe_id).unwrap_or_default())
}

#[derive(FromRow)]
struct RecipeTagRow {
    recipe_id: Id,
    #[sqlx(flatten)]
    tag: Tag,
}

/// Tags of a whole page of recipes in one query, keyed by recipe.
pub async fn list_tags_for_recipes(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<Tag>>, ApiError> {
    let rows: Vec<RecipeTagRow> = sqlx::query_as(
        "
        SELECT rt.recipe_id AS recipe_id, t.* FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await?;

    Ok(group_by_recipe(rows.into_iter().map(|row| (row.recipe_id, row.tag))))
}

/// Seeds tags, skipping slugs that already exist. Returns the number inserted.
pub async fn insert_tags(
    tags: &[(&str, &str, &str)],
    pool: &Pool<Postgres>,
) -> Result<u64, ApiError> {
    if let Some((_, color, slug)) = tags.iter().find(|(name, color, slug)| {
        name.chars().count() > TAG_NAME_MAX_LENGTH || !is_valid_color(color) || !is_valid_slug(slug)
    }) {
        return Err(ApiError::BadRequest(format!(
            "Invalid tag definition: slug '{slug}', color '{color}'"
        )));
    }
    if tags.is_empty() {
        return Ok(0);
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO tags (name, color, slug) ");
    query_builder.push_values(tags.iter(), |mut b, (name, color, slug)| {
        b.push_bind(*name).push_bind(*color).push_bind(*slug);
    });
    query_builder.push(" ON CONFLICT (slug) DO NOTHING");

    let result = query_builder.build().execute(pool).await?;

    Ok(result.rows_affected())
}

/// Rejects the first id that has no tag behind it.
pub(crate) async fn ensure_tags_exist(conn: &mut PgConnection, ids: &[Id]) -> Result<(), ApiError> {
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    match first_missing(ids, found.iter().map(|row| row.0)) {
        Some(id) => Err(ApiError::field(
            "tags",
            &format!("Invalid pk \"{id}\" - object does not exist."),
        )),
        None => Ok(()),
    }
}

pub(crate) fn first_missing(requested: &[Id], found: impl Iterator<Item = Id>) -> Option<Id> {
    let found: HashSet<Id> = found.collect();
    requested.iter().copied().find(|id| !found.contains(id))
}

/// Keeps the row order inside every group.
pub(crate) fn group_by_recipe<T>(rows: impl IntoIterator<Item = (Id, T)>) -> HashMap<Id, Vec<T>> {
    let mut groups: HashMap<Id, Vec<T>> = HashMap::new();
    for (recipe_id, item) in rows {
        groups.entry(recipe_id).or_default().push(item);
    }
    groups
}
