//! Storage-backed workflow checks. They need a Postgres `DATABASE_URL` and are
//! skipped by default: `cargo test -- --ignored`.

use std::path::PathBuf;

use foodgram::{
    actions::{
        add_membership, build_shopping_list, count_members, create_recipe, delete_recipe,
        get_recipe, get_recipe_mut,
        insert_ingredients, insert_tags, is_subscribed, list_recipe_parts, list_recipe_tags,
        list_tags, register_user, remove_membership, search_ingredients, subscribe, update_recipe,
        Membership, NewIngredient,
    },
    error::{ApiError, RecipeRule},
    form::{IngredientAmount, NewRecipe, RecipeChanges, RegistrationForm},
    jwt::SessionData,
    schema::{Id, UserRole},
    views::recipe_views,
    DEFAULT_TAGS,
};
use sqlx::PgPool;

fn media_root() -> PathBuf {
    std::env::temp_dir().join("foodgram-tests")
}

async fn user(name: &str, pool: &PgPool) -> SessionData {
    let profile = register_user(
        RegistrationForm {
            email: format!("{name}@example.com"),
            username: name.to_owned(),
            first_name: "Test".into(),
            last_name: "User".into(),
            password: "password".into(),
        },
        pool,
    )
    .await
    .unwrap();

    SessionData {
        user_id: profile.id,
        username: profile.username,
        role: UserRole::User,
        is_admin: false,
    }
}

/// Seeds the catalog and returns (tag ids, ingredient ids).
async fn catalog(pool: &PgPool) -> (Vec<Id>, Vec<Id>) {
    insert_tags(DEFAULT_TAGS, pool).await.unwrap();
    insert_ingredients(
        &[
            NewIngredient {
                name: "Sugar".into(),
                measurement_unit: "grams".into(),
            },
            NewIngredient {
                name: "Egg".into(),
                measurement_unit: "pcs".into(),
            },
            NewIngredient {
                name: "Milk".into(),
                measurement_unit: "ml".into(),
            },
        ],
        pool,
    )
    .await
    .unwrap();

    let tags = list_tags(pool).await.unwrap().into_iter().map(|t| t.id).collect();
    let ingredients = search_ingredients(None, pool)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();

    (tags, ingredients)
}

fn recipe(tags: Vec<Id>, ingredients: Vec<(Id, i32)>) -> NewRecipe {
    NewRecipe {
        name: "Pancakes".into(),
        text: "Mix and fry.".into(),
        cooking_time: 15,
        image: None,
        tags,
        ingredients: ingredients
            .into_iter()
            .map(|(id, amount)| IngredientAmount { id, amount })
            .collect(),
    }
}

async fn recipe_count(pool: &PgPool) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes")
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn create_stores_every_tag_and_ingredient_line(pool: PgPool) {
    let author = user("author", &pool).await;
    let (tags, ingredients) = catalog(&pool).await;

    let id = create_recipe(
        &author,
        recipe(
            vec![tags[0], tags[1]],
            vec![(ingredients[0], 100), (ingredients[1], 2), (ingredients[2], 300)],
        ),
        &media_root(),
        &pool,
    )
    .await
    .unwrap();

    assert_eq!(list_recipe_tags(id, &pool).await.unwrap().len(), 2);
    assert_eq!(list_recipe_parts(id, &pool).await.unwrap().len(), 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn duplicate_lines_leave_no_recipe_behind(pool: PgPool) {
    let author = user("author", &pool).await;
    let (tags, ingredients) = catalog(&pool).await;

    let result = create_recipe(
        &author,
        recipe(vec![tags[0]], vec![(ingredients[0], 1), (ingredients[0], 2)]),
        &media_root(),
        &pool,
    )
    .await;
    assert!(matches!(
        result,
        Err(ApiError::Rule(RecipeRule::DuplicateIngredientInRecipe))
    ));

    let result = create_recipe(
        &author,
        recipe(vec![tags[0], tags[0]], vec![(ingredients[0], 1)]),
        &media_root(),
        &pool,
    )
    .await;
    assert!(result.is_err());

    assert_eq!(recipe_count(&pool).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn unknown_references_are_field_errors(pool: PgPool) {
    let author = user("author", &pool).await;
    let (tags, ingredients) = catalog(&pool).await;

    let result = create_recipe(
        &author,
        recipe(vec![tags[0], 9999], vec![(ingredients[0], 1)]),
        &media_root(),
        &pool,
    )
    .await;

    let Err(ApiError::Validation(errors)) = result else {
        panic!("expected field errors");
    };
    assert!(errors.contains_key("tags"));
    assert_eq!(recipe_count(&pool).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn patch_only_replaces_the_collections_it_carries(pool: PgPool) {
    let author = user("author", &pool).await;
    let (tags, ingredients) = catalog(&pool).await;
    let id = create_recipe(
        &author,
        recipe(vec![tags[0]], vec![(ingredients[0], 100), (ingredients[1], 2)]),
        &media_root(),
        &pool,
    )
    .await
    .unwrap();

    let current = get_recipe_mut(id, &author, &pool).await.unwrap();
    update_recipe(
        &current,
        RecipeChanges {
            tags: Some(vec![tags[2], tags[3]]),
            ..Default::default()
        },
        &media_root(),
        &pool,
    )
    .await
    .unwrap();

    let tag_ids: Vec<Id> = list_recipe_tags(id, &pool)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(tag_ids, vec![tags[2], tags[3]]);
    assert_eq!(list_recipe_parts(id, &pool).await.unwrap().len(), 2);

    update_recipe(
        &current,
        RecipeChanges {
            ingredients: Some(vec![IngredientAmount {
                id: ingredients[2],
                amount: 5,
            }]),
            ..Default::default()
        },
        &media_root(),
        &pool,
    )
    .await
    .unwrap();

    let parts = list_recipe_parts(id, &pool).await.unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].ingredient_id, ingredients[2]);
    assert_eq!(list_recipe_tags(id, &pool).await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn only_the_author_may_change_a_recipe(pool: PgPool) {
    let author = user("author", &pool).await;
    let stranger = user("stranger", &pool).await;
    let (tags, ingredients) = catalog(&pool).await;
    let id = create_recipe(
        &author,
        recipe(vec![tags[0]], vec![(ingredients[0], 1)]),
        &media_root(),
        &pool,
    )
    .await
    .unwrap();

    assert!(matches!(
        get_recipe_mut(id, &stranger, &pool).await,
        Err(ApiError::Forbidden)
    ));
    assert!(matches!(
        get_recipe_mut(id + 1, &author, &pool).await,
        Err(ApiError::NotFound(_))
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn a_page_of_views_keeps_every_recipe_apart(pool: PgPool) {
    let author = user("author", &pool).await;
    let reader = user("reader", &pool).await;
    let (tags, ingredients) = catalog(&pool).await;

    let first = create_recipe(
        &author,
        recipe(vec![tags[0]], vec![(ingredients[0], 1)]),
        &media_root(),
        &pool,
    )
    .await
    .unwrap();
    let second = create_recipe(
        &author,
        recipe(vec![tags[1], tags[2]], vec![(ingredients[1], 2), (ingredients[2], 3)]),
        &media_root(),
        &pool,
    )
    .await
    .unwrap();
    add_membership(Membership::Favorite, second, &reader, &pool)
        .await
        .unwrap();

    let mut recipes = Vec::new();
    for id in [second, first] {
        recipes.push(get_recipe(id, &pool).await.unwrap().unwrap());
    }
    let views = recipe_views(recipes, Some(reader.user_id), "/media/", &pool)
        .await
        .unwrap();

    assert_eq!(views.len(), 2);
    assert_eq!(views[0].id, second);
    assert_eq!(views[0].tags.len(), 2);
    assert_eq!(views[0].ingredients.len(), 2);
    assert!(views[0].is_favorited);
    assert_eq!(views[1].id, first);
    assert_eq!(views[1].tags.len(), 1);
    assert_eq!(views[1].ingredients[0].ingredient_id, ingredients[0]);
    assert!(!views[1].is_favorited);
    assert_eq!(views[1].author.profile.id, author.user_id);
}

async fn rows_for_recipe(table: &str, id: Id, pool: &PgPool) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM {table} WHERE recipe_id = $1"
    ))
    .bind(id)
    .fetch_one(pool)
    .await
    .unwrap();
    count
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn deleting_a_recipe_takes_its_dependents_along(pool: PgPool) {
    let author = user("author", &pool).await;
    let reader = user("reader", &pool).await;
    let (tags, ingredients) = catalog(&pool).await;
    let id = create_recipe(
        &author,
        recipe(vec![tags[0], tags[1]], vec![(ingredients[0], 1), (ingredients[1], 2)]),
        &media_root(),
        &pool,
    )
    .await
    .unwrap();

    for session in [&author, &reader] {
        add_membership(Membership::Favorite, id, session, &pool)
            .await
            .unwrap();
        add_membership(Membership::ShoppingCart, id, session, &pool)
            .await
            .unwrap();
    }
    assert_eq!(rows_for_recipe("favorites", id, &pool).await, 2);

    let current = get_recipe_mut(id, &author, &pool).await.unwrap();
    delete_recipe(&current, &media_root(), &pool).await.unwrap();

    assert_eq!(recipe_count(&pool).await, 0);
    for table in ["recipe_ingredients", "recipe_tags", "favorites", "shopping_carts"] {
        assert_eq!(rows_for_recipe(table, id, &pool).await, 0, "{table}");
    }
    assert!(build_shopping_list(&reader, &pool).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn favoriting_twice_conflicts(pool: PgPool) {
    let author = user("author", &pool).await;
    let (tags, ingredients) = catalog(&pool).await;
    let id = create_recipe(
        &author,
        recipe(vec![tags[0]], vec![(ingredients[0], 1)]),
        &media_root(),
        &pool,
    )
    .await
    .unwrap();

    add_membership(Membership::Favorite, id, &author, &pool)
        .await
        .unwrap();
    let second = add_membership(Membership::Favorite, id, &author, &pool).await;

    assert!(matches!(second, Err(ApiError::Conflict(_))));
    assert_eq!(count_members(Membership::Favorite, id, &pool).await.unwrap(), 1);

    let missing = add_membership(Membership::Favorite, id + 100, &author, &pool).await;
    assert!(matches!(missing, Err(ApiError::BadRequest(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn removing_a_pair_that_was_never_added_is_not_found(pool: PgPool) {
    let author = user("author", &pool).await;
    let (tags, ingredients) = catalog(&pool).await;
    let id = create_recipe(
        &author,
        recipe(vec![tags[0]], vec![(ingredients[0], 1)]),
        &media_root(),
        &pool,
    )
    .await
    .unwrap();

    let result = remove_membership(Membership::ShoppingCart, id, &author, &pool).await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn shopping_list_sums_the_cart(pool: PgPool) {
    let author = user("author", &pool).await;
    let (tags, ingredients) = catalog(&pool).await;
    let sugar = ingredients[2];

    for amount in [100, 50] {
        let id = create_recipe(
            &author,
            recipe(vec![tags[0]], vec![(sugar, amount)]),
            &media_root(),
            &pool,
        )
        .await
        .unwrap();
        add_membership(Membership::ShoppingCart, id, &author, &pool)
            .await
            .unwrap();
    }

    let items = build_shopping_list(&author, &pool).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Sugar");
    assert_eq!(items[0].measurement_unit, "grams");
    assert_eq!(items[0].amount, 150);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at Postgres"]
async fn subscriptions_are_unique_and_never_to_yourself(pool: PgPool) {
    let reader = user("reader", &pool).await;
    let author = user("author", &pool).await;

    assert!(matches!(
        subscribe(reader.user_id, &reader, &pool).await,
        Err(ApiError::BadRequest(_))
    ));

    subscribe(author.user_id, &reader, &pool).await.unwrap();
    assert!(matches!(
        subscribe(author.user_id, &reader, &pool).await,
        Err(ApiError::Conflict(_))
    ));

    assert!(is_subscribed(Some(reader.user_id), author.user_id, &pool)
        .await
        .unwrap());
    assert!(!is_subscribed(None, author.user_id, &pool).await.unwrap());
}
