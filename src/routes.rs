use std::convert::Infallible;

use serde::Serialize;
use serde_json::json;
use warp::{
    filters::{body::BodyDeserializeError, BoxedFilter},
    http::{header::CONTENT_DISPOSITION, StatusCode},
    reject::{InvalidQuery, MethodNotAllowed, PayloadTooLarge, Rejection, UnsupportedMediaType},
    reply::{self, Reply, Response},
    Filter,
};

use crate::{
    actions::{
        add_membership, build_shopping_list, create_recipe, delete_recipe, fetch_recipes,
        fetch_subscriptions, fetch_users, get_ingredient, get_profile, get_recipe, get_recipe_mut,
        get_tag, list_tags, login_user, register_user, remove_membership, search_ingredients,
        subscribe, unsubscribe, update_recipe, Membership, RecipeFilter,
    },
    constants::{MAX_BODY_SIZE, SHOPPING_LIST_FILENAME},
    error::ApiError,
    form::{LoginForm, RecipeForm, RegistrationForm},
    jwt::SessionData,
    middleware::{with_possible_session, with_session},
    pagination::{PageQuery, QueryPairs},
    report::render_shopping_list,
    schema::{Id, Recipe},
    state::State,
    views::{recipe_view, recipe_views, subscription_view, user_view, RecipeSummary, RecipeView},
    get_or, CacheKey,
};

fn with_state(state: State) -> impl Filter<Extract = (State,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn query_pairs() -> impl Filter<Extract = (QueryPairs,), Error = Rejection> + Clone {
    warp::query::<QueryPairs>()
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(value), status).into_response()
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

fn query_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn recipes_limit(pairs: &[(String, String)]) -> Result<Option<i64>, ApiError> {
    match query_value(pairs, "recipes_limit") {
        None => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .ok()
            .filter(|limit| *limit >= 0)
            .map(Some)
            .ok_or_else(|| ApiError::field("recipes_limit", "A valid integer is required.")),
    }
}

/// All routes, without the rejection recovery.
pub fn routes(state: State) -> BoxedFilter<(Response,)> {
    recipe_routes(state.clone())
        .or(membership_routes(state.clone()))
        .unify()
        .or(catalog_routes(state.clone()))
        .unify()
        .or(user_routes(state.clone()))
        .unify()
        .or(media_route(&state))
        .unify()
        .boxed()
}

/// The full server filter: routes, JSON error envelope and access log.
pub fn api(state: State) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    routes(state)
        .recover(handle_rejection)
        .unify()
        .with(warp::log("foodgram::access"))
}

fn recipe_routes(state: State) -> BoxedFilter<(Response,)> {
    let key = state.session_key.clone();

    let list = warp::path!("recipes")
        .and(warp::get())
        .and(query_pairs())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(list_recipes_handler);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(json_body::<RecipeForm>())
        .and(with_state(state.clone()))
        .and_then(create_recipe_handler);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(download_shopping_cart_handler);

    let retrieve = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(get_recipe_handler);

    let update = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(with_session(key.clone()))
        .and(json_body::<RecipeForm>())
        .and(with_state(state.clone()))
        .and_then(update_recipe_handler);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_session(key))
        .and(with_state(state))
        .and_then(delete_recipe_handler);

    list.or(create)
        .unify()
        .or(download)
        .unify()
        .or(retrieve)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .boxed()
}

fn membership_routes(state: State) -> BoxedFilter<(Response,)> {
    let key = state.session_key.clone();
    let membership = warp::path("favorite")
        .map(|| Membership::Favorite)
        .or(warp::path("shopping_cart").map(|| Membership::ShoppingCart))
        .unify();

    let add = warp::path("recipes")
        .and(warp::path::param::<Id>())
        .and(membership.clone())
        .and(warp::path::end())
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(add_membership_handler);

    let remove = warp::path("recipes")
        .and(warp::path::param::<Id>())
        .and(membership)
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_session(key))
        .and(with_state(state))
        .and_then(remove_membership_handler);

    add.or(remove).unify().boxed()
}

fn catalog_routes(state: State) -> BoxedFilter<(Response,)> {
    let tags = warp::path!("tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_tags_handler);

    let tag = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(get_tag_handler);

    let ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(query_pairs())
        .and(with_state(state.clone()))
        .and_then(search_ingredients_handler);

    let ingredient = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_state(state))
        .and_then(get_ingredient_handler);

    tags.or(tag)
        .unify()
        .or(ingredients)
        .unify()
        .or(ingredient)
        .unify()
        .boxed()
}

fn user_routes(state: State) -> BoxedFilter<(Response,)> {
    let key = state.session_key.clone();

    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body::<RegistrationForm>())
        .and(with_state(state.clone()))
        .and_then(register_handler);

    let list = warp::path!("users")
        .and(warp::get())
        .and(query_pairs())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(list_users_handler);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(me_handler);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(query_pairs())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(subscriptions_handler);

    let profile = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(profile_handler);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::post())
        .and(query_pairs())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(subscribe_handler);

    let unsubscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_session(key))
        .and(with_state(state.clone()))
        .and_then(unsubscribe_handler);

    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body::<LoginForm>())
        .and(with_state(state))
        .and_then(login_handler);

    register
        .or(list)
        .unify()
        .or(me)
        .unify()
        .or(subscriptions)
        .unify()
        .or(profile)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .or(login)
        .unify()
        .boxed()
}

fn media_route(state: &State) -> BoxedFilter<(Response,)> {
    let segment = state
        .config
        .media_url
        .trim_matches('/')
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("media")
        .to_owned();

    warp::path(segment)
        .and(warp::get())
        .and(warp::fs::dir(state.config.media_root.clone()))
        .map(|file: warp::fs::File| file.into_response())
        .boxed()
}

// Recipes

async fn render_recipe(
    recipe: Recipe,
    requester: Option<Id>,
    state: &State,
) -> Result<RecipeView, ApiError> {
    recipe_view(recipe, requester, &state.config.media_url, &state.pool).await
}

async fn list_recipes_handler(
    pairs: QueryPairs,
    session: Option<SessionData>,
    state: State,
) -> Result<Response, Rejection> {
    let filter = RecipeFilter::from_pairs(&pairs)?;
    let query = PageQuery::from_pairs(&pairs, state.config.page_size)?;
    let requester = session.map(|s| s.user_id);

    let mut page = fetch_recipes(&filter, requester, query, &state.pool).await?;
    let recipes = std::mem::take(&mut page.results);
    let views = recipe_views(recipes, requester, &state.config.media_url, &state.pool).await?;

    Ok(json_reply(&page.with_results(views), StatusCode::OK))
}

async fn get_recipe_handler(
    id: Id,
    session: Option<SessionData>,
    state: State,
) -> Result<Response, Rejection> {
    let recipe = get_recipe(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;
    let view = render_recipe(recipe, session.map(|s| s.user_id), &state).await?;

    Ok(json_reply(&view, StatusCode::OK))
}

async fn create_recipe_handler(
    session: SessionData,
    form: RecipeForm,
    state: State,
) -> Result<Response, Rejection> {
    let recipe = form.validate_new(&state.recipe_limits())?;
    let id = create_recipe(&session, recipe, &state.config.media_root, &state.pool).await?;

    let recipe = get_recipe(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;
    let view = render_recipe(recipe, Some(session.user_id), &state).await?;

    Ok(json_reply(&view, StatusCode::CREATED))
}

async fn update_recipe_handler(
    id: Id,
    session: SessionData,
    form: RecipeForm,
    state: State,
) -> Result<Response, Rejection> {
    let recipe = get_recipe_mut(id, &session, &state.pool).await?;
    let changes = form.validate_changes(&state.recipe_limits())?;
    update_recipe(&recipe, changes, &state.config.media_root, &state.pool).await?;

    let recipe = get_recipe(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;
    let view = render_recipe(recipe, Some(session.user_id), &state).await?;

    Ok(json_reply(&view, StatusCode::OK))
}

async fn delete_recipe_handler(
    id: Id,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    let recipe = get_recipe_mut(id, &session, &state.pool).await?;
    delete_recipe(&recipe, &state.config.media_root, &state.pool).await?;

    Ok(no_content())
}

async fn add_membership_handler(
    id: Id,
    membership: Membership,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    let recipe = add_membership(membership, id, &session, &state.pool).await?;

    Ok(json_reply(
        &RecipeSummary::new(&recipe, &state.config.media_url),
        StatusCode::CREATED,
    ))
}

async fn remove_membership_handler(
    id: Id,
    membership: Membership,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    remove_membership(membership, id, &session, &state.pool).await?;

    Ok(no_content())
}

async fn download_shopping_cart_handler(
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    let items = build_shopping_list(&session, &state.pool).await?;
    let document = render_shopping_list(&items);

    Ok(reply::with_header(
        document,
        CONTENT_DISPOSITION,
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    )
    .into_response())
}

// Catalog

async fn list_tags_handler(state: State) -> Result<Response, Rejection> {
    let tags = get_or(CacheKey::TagList, state.cache.as_ref(), || {
        list_tags(&state.pool)
    })
    .await?;

    Ok(json_reply(&tags, StatusCode::OK))
}

async fn get_tag_handler(id: Id, state: State) -> Result<Response, Rejection> {
    let tag = get_or(CacheKey::Tag(id), state.cache.as_ref(), || {
        get_tag(id, &state.pool)
    })
    .await?
    .ok_or_else(ApiError::not_found)?;

    Ok(json_reply(&tag, StatusCode::OK))
}

async fn search_ingredients_handler(pairs: QueryPairs, state: State) -> Result<Response, Rejection> {
    let prefix = query_value(&pairs, "search")
        .or_else(|| query_value(&pairs, "name"))
        .unwrap_or("")
        .to_owned();

    let ingredients = get_or(
        CacheKey::IngredientSearch(prefix.to_owned()),
        state.cache.as_ref(),
        || search_ingredients(Some(&prefix), &state.pool),
    )
    .await?;

    Ok(json_reply(&ingredients, StatusCode::OK))
}

async fn get_ingredient_handler(id: Id, state: State) -> Result<Response, Rejection> {
    let ingredient = get_or(CacheKey::Ingredient(id), state.cache.as_ref(), || {
        get_ingredient(id, &state.pool)
    })
    .await?
    .ok_or_else(ApiError::not_found)?;

    Ok(json_reply(&ingredient, StatusCode::OK))
}

// Users

async fn register_handler(form: RegistrationForm, state: State) -> Result<Response, Rejection> {
    let profile = register_user(form, &state.pool).await?;

    Ok(json_reply(&profile, StatusCode::CREATED))
}

async fn login_handler(form: LoginForm, state: State) -> Result<Response, Rejection> {
    let token = login_user(form, &state.session_key, &state.pool).await?;

    Ok(json_reply(&json!({ "auth_token": token }), StatusCode::OK))
}

async fn list_users_handler(
    pairs: QueryPairs,
    session: Option<SessionData>,
    state: State,
) -> Result<Response, Rejection> {
    let query = PageQuery::from_pairs(&pairs, state.config.page_size)?;
    let requester = session.map(|s| s.user_id);

    let mut page = fetch_users(query, &state.pool).await?;
    let mut views = Vec::with_capacity(page.results.len());
    for profile in std::mem::take(&mut page.results) {
        views.push(user_view(profile, requester, &state.pool).await?);
    }

    Ok(json_reply(&page.with_results(views), StatusCode::OK))
}

async fn me_handler(session: SessionData, state: State) -> Result<Response, Rejection> {
    let profile = get_profile(session.user_id, &state.pool).await?;
    let view = user_view(profile, Some(session.user_id), &state.pool).await?;

    Ok(json_reply(&view, StatusCode::OK))
}

async fn profile_handler(
    id: Id,
    session: Option<SessionData>,
    state: State,
) -> Result<Response, Rejection> {
    let profile = get_profile(id, &state.pool).await?;
    let view = user_view(profile, session.map(|s| s.user_id), &state.pool).await?;

    Ok(json_reply(&view, StatusCode::OK))
}

async fn subscriptions_handler(
    pairs: QueryPairs,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    let query = PageQuery::from_pairs(&pairs, state.config.page_size)?;
    let limit = recipes_limit(&pairs)?;

    let mut page = fetch_subscriptions(&session, query, &state.pool).await?;
    let mut views = Vec::with_capacity(page.results.len());
    for profile in std::mem::take(&mut page.results) {
        views.push(subscription_view(profile, limit, &state.config.media_url, &state.pool).await?);
    }

    Ok(json_reply(&page.with_results(views), StatusCode::OK))
}

async fn subscribe_handler(
    id: Id,
    pairs: QueryPairs,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    let limit = recipes_limit(&pairs)?;
    let author = subscribe(id, &session, &state.pool).await?;
    let view = subscription_view(author, limit, &state.config.media_url, &state.pool).await?;

    Ok(json_reply(&view, StatusCode::CREATED))
}

async fn unsubscribe_handler(
    id: Id,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    unsubscribe(id, &session, &state.pool).await?;

    Ok(no_content())
}

// Errors

fn detail(message: &str, status: StatusCode) -> Response {
    json_reply(&json!({ "detail": message }), status)
}

/// Turns every rejection into the JSON error envelope.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if let Some(e) = err.find::<ApiError>() {
        return Ok(e.to_response());
    }
    if err.is_not_found() {
        return Ok(detail("Not found.", StatusCode::NOT_FOUND));
    }
    if let Some(e) = err.find::<BodyDeserializeError>() {
        return Ok(detail(&format!("JSON parse error - {e}"), StatusCode::BAD_REQUEST));
    }
    if let Some(e) = err.find::<InvalidQuery>() {
        return Ok(detail(&e.to_string(), StatusCode::BAD_REQUEST));
    }
    if err.find::<PayloadTooLarge>().is_some() {
        return Ok(detail("Request body is too large.", StatusCode::PAYLOAD_TOO_LARGE));
    }
    if err.find::<UnsupportedMediaType>().is_some() {
        return Ok(detail(
            "Unsupported media type in request.",
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ));
    }
    if err.find::<MethodNotAllowed>().is_some() {
        return Ok(detail("Method not allowed.", StatusCode::METHOD_NOT_ALLOWED));
    }

    log::error!("> Unhandled rejection: {err:?}");
    Ok(detail("Internal server error", StatusCode::INTERNAL_SERVER_ERROR))
}
