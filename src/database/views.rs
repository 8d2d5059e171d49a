use std::collections::HashMap;

use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::{
    actions::{
        count_author_recipes, get_profile, is_favorited, is_in_shopping_cart, is_subscribed,
        list_author_recipes, list_parts_for_recipes, list_tags_for_recipes,
    },
    error::ApiError,
    media::image_url,
    schema::{Id, Recipe, RecipePart, Tag, UserProfile},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserView {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub is_subscribed: bool,
}

/// Short projection returned by favorite/cart toggles and subscription listings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecipeSummary {
    pub id: Id,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

impl RecipeSummary {
    pub fn new(recipe: &Recipe, media_url: &str) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.to_owned(),
            image: recipe.image.as_deref().map(|path| image_url(media_url, path)),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeView {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<RecipePart>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub user: UserView,
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

pub async fn user_view(
    profile: UserProfile,
    requester: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<UserView, ApiError> {
    let is_subscribed = is_subscribed(requester, profile.id, pool).await?;

    Ok(UserView {
        profile,
        is_subscribed,
    })
}

/// Full projection; the flags are computed for `requester`.
pub async fn recipe_view(
    recipe: Recipe,
    requester: Option<Id>,
    media_url: &str,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, ApiError> {
    recipe_views(vec![recipe], requester, media_url, pool)
        .await?
        .pop()
        .ok_or_else(ApiError::not_found)
}

/// Projects a page of recipes. Tags, ingredient lines and authors are loaded
/// once for the page; the per-requester flags are read per recipe.
pub async fn recipe_views(
    recipes: Vec<Recipe>,
    requester: Option<Id>,
    media_url: &str,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeView>, ApiError> {
    if recipes.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Id> = recipes.iter().map(|recipe| recipe.id).collect();
    let mut tags = list_tags_for_recipes(&ids, pool).await?;
    let mut parts = list_parts_for_recipes(&ids, pool).await?;

    let mut authors: HashMap<Id, UserView> = HashMap::new();
    for recipe in &recipes {
        if !authors.contains_key(&recipe.author_id) {
            let profile = get_profile(recipe.author_id, pool).await?;
            authors.insert(recipe.author_id, user_view(profile, requester, pool).await?);
        }
    }

    let mut views = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        let author = authors
            .get(&recipe.author_id)
            .cloned()
            .ok_or_else(ApiError::not_found)?;

        views.push(RecipeView {
            id: recipe.id,
            tags: tags.remove(&recipe.id).unwrap_or_default(),
            author,
            ingredients: parts.remove(&recipe.id).unwrap_or_default(),
            is_favorited: is_favorited(requester, recipe.id, pool).await?,
            is_in_shopping_cart: is_in_shopping_cart(requester, recipe.id, pool).await?,
            image: recipe.image.as_deref().map(|path| image_url(media_url, path)),
            name: recipe.name,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        });
    }

    Ok(views)
}

pub async fn subscription_view(
    profile: UserProfile,
    recipes_limit: Option<i64>,
    media_url: &str,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionView, ApiError> {
    let recipes = list_author_recipes(profile.id, recipes_limit, pool).await?;
    let recipes_count = count_author_recipes(profile.id, pool).await?;

    Ok(SubscriptionView {
        user: UserView {
            profile,
            is_subscribed: true,
        },
        recipes: recipes
            .iter()
            .map(|recipe| RecipeSummary::new(recipe, media_url))
            .collect(),
        recipes_count,
    })
}
