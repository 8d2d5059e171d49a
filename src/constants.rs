pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const MAX_COUNT_PER_PAGE: i64 = 100;

pub const RECIPE_NAME_MAX_LENGTH: usize = 200;
pub const MIN_COOKING_TIME: i32 = 1;
pub const MIN_INGREDIENT_AMOUNT: i32 = 1;

pub const TAG_NAME_MAX_LENGTH: usize = 200;
pub const TAG_COLOR_MAX_LENGTH: usize = 7;
pub const TAG_SLUG_MAX_LENGTH: usize = 200;

pub const EMAIL_MAX_LENGTH: usize = 254;
pub const USER_NAME_MAX_LENGTH: usize = 150;

pub const IMAGE_DIRECTORY: &str = "recipes/images";

/// (name, color, slug)
pub const DEFAULT_TAGS: &[(&str, &str, &str)] = &[
    ("Breakfast", "#DAA520", "breakfast"),
    ("Lunch", "#3CB371", "lunch"),
    ("Dinner", "#FA8072", "dinner"),
    ("Late night snack", "#000000", "junkfood"),
];

pub const SHOPPING_LIST_TITLE: &str = "Shopping list";
pub const SHOPPING_LIST_FILENAME: &str = "shopping_cart.txt";

pub const MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;

pub const CATALOG_CACHE_TTL_SECONDS: u64 = 60 * 60;
pub const MAX_CACHED_SEARCH_LENGTH: usize = 16;
