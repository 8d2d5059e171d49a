use std::{collections::HashSet, hash::Hash};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    constants::{
        EMAIL_MAX_LENGTH, MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT, RECIPE_NAME_MAX_LENGTH,
        USER_NAME_MAX_LENGTH,
    },
    error::{ApiError, FieldErrors, RecipeRule, BLANK, REQUIRED},
    media::{decode_data_uri, ImageUpload},
    schema::Id,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i32,
}

/// Incoming recipe payload for both POST and PATCH. Every key is optional
/// here; which ones are required depends on the operation.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeForm {
    pub tags: Option<Vec<Id>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub image: Option<Option<String>>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
}

// Distinguishes an explicit `null` from a missing key.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy)]
pub struct RecipeLimits {
    pub name_max_length: usize,
}

impl Default for RecipeLimits {
    fn default() -> Self {
        Self {
            name_max_length: RECIPE_NAME_MAX_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipe {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: Option<ImageUpload>,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
}

/// A validated PATCH. `None` means "leave as is"; `image: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeChanges {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<Option<ImageUpload>>,
    pub tags: Option<Vec<Id>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
}

impl RecipeChanges {
    pub fn touches_scalars(&self) -> bool {
        self.name.is_some()
            || self.text.is_some()
            || self.cooking_time.is_some()
            || self.image.is_some()
    }
}

impl RecipeForm {
    pub fn validate_new(self, limits: &RecipeLimits) -> Result<NewRecipe, ApiError> {
        let mut errors = FieldErrors::new();
        for (field, present) in [
            ("tags", self.tags.is_some()),
            ("ingredients", self.ingredients.is_some()),
            ("name", self.name.is_some()),
            ("text", self.text.is_some()),
            ("cooking_time", self.cooking_time.is_some()),
        ] {
            if !present {
                push_error(&mut errors, field, REQUIRED);
            }
        }

        let image = self.check_fields(&mut errors);
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        let (Some(tags), Some(ingredients), Some(name), Some(text), Some(cooking_time)) = (
            self.tags,
            self.ingredients,
            self.name,
            self.text,
            self.cooking_time,
        ) else {
            return Err(ApiError::Validation(errors));
        };

        check_rules(
            Some(&tags),
            Some(&name),
            Some(&ingredients),
            Some(cooking_time),
            limits,
        )?;

        Ok(NewRecipe {
            name,
            text,
            cooking_time,
            image: image.flatten(),
            tags,
            ingredients,
        })
    }

    pub fn validate_changes(self, limits: &RecipeLimits) -> Result<RecipeChanges, ApiError> {
        let mut errors = FieldErrors::new();
        let image = self.check_fields(&mut errors);
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        check_rules(
            self.tags.as_deref(),
            self.name.as_deref(),
            self.ingredients.as_deref(),
            self.cooking_time,
            limits,
        )?;

        Ok(RecipeChanges {
            name: self.name,
            text: self.text,
            cooking_time: self.cooking_time,
            image,
            tags: self.tags,
            ingredients: self.ingredients,
        })
    }

    /// Per-field checks. Returns the decoded image when one was submitted.
    fn check_fields(&self, errors: &mut FieldErrors) -> Option<Option<ImageUpload>> {
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            push_error(errors, "name", BLANK);
        }
        if self.text.as_deref().is_some_and(|text| text.trim().is_empty()) {
            push_error(errors, "text", BLANK);
        }

        if let Some(ingredients) = &self.ingredients {
            if ingredients
                .iter()
                .any(|line| line.amount < MIN_INGREDIENT_AMOUNT)
            {
                push_error(
                    errors,
                    "ingredients",
                    &format!("Ingredient amount must be at least {MIN_INGREDIENT_AMOUNT}."),
                );
            }
        }

        match &self.image {
            None => None,
            Some(None) => Some(None),
            Some(Some(value)) => match decode_data_uri(value) {
                Ok(image) => Some(Some(image)),
                Err(message) => {
                    push_error(errors, "image", &message);
                    None
                }
            },
        }
    }
}

/// Whole-payload rules; the first violation wins.
pub fn check_rules(
    tags: Option<&[Id]>,
    name: Option<&str>,
    ingredients: Option<&[IngredientAmount]>,
    cooking_time: Option<i32>,
    limits: &RecipeLimits,
) -> Result<(), RecipeRule> {
    if tags.is_some_and(|tags| tags.is_empty()) {
        return Err(RecipeRule::EmptyTags);
    }
    if name.is_some_and(|name| name.chars().count() > limits.name_max_length) {
        return Err(RecipeRule::NameTooLong(limits.name_max_length));
    }
    if ingredients.is_some_and(|ingredients| ingredients.is_empty()) {
        return Err(RecipeRule::EmptyIngredients);
    }
    if cooking_time.is_some_and(|time| time < MIN_COOKING_TIME) {
        return Err(RecipeRule::CookingTimeTooShort);
    }
    if tags.is_some_and(|tags| has_duplicates(tags.iter())) {
        return Err(RecipeRule::DuplicateTags);
    }
    if ingredients.is_some_and(|ingredients| has_duplicates(ingredients.iter().map(|i| i.id))) {
        return Err(RecipeRule::DuplicateIngredients);
    }

    Ok(())
}

pub fn has_duplicates<T, I>(items: I) -> bool
where
    T: Eq + Hash,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items.into_iter().any(|item| !seen.insert(item))
}

pub fn push_error(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_owned())
        .or_default()
        .push(message.to_owned());
}

#[derive(Debug, Deserialize)]
pub struct RegistrationForm {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();

        for (field, value, max_length) in [
            ("email", &self.email, EMAIL_MAX_LENGTH),
            ("username", &self.username, USER_NAME_MAX_LENGTH),
            ("first_name", &self.first_name, USER_NAME_MAX_LENGTH),
            ("last_name", &self.last_name, USER_NAME_MAX_LENGTH),
        ] {
            if value.trim().is_empty() {
                push_error(&mut errors, field, BLANK);
            } else if value.chars().count() > max_length {
                push_error(
                    &mut errors,
                    field,
                    &format!("Ensure this field has no more than {max_length} characters."),
                );
            }
        }

        if !self.email.trim().is_empty() && !is_valid_email(&self.email) {
            push_error(&mut errors, "email", "Enter a valid email address.");
        }
        if !self.username.trim().is_empty() && !is_valid_username(&self.username) {
            push_error(
                &mut errors,
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
        if self.password.is_empty() {
            push_error(&mut errors, "password", BLANK);
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        Ok(())
    }
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    }
}

fn is_valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::json;

    use super::*;

    fn form(value: serde_json::Value) -> RecipeForm {
        serde_json::from_value(value).unwrap()
    }

    fn valid() -> serde_json::Value {
        json!({
            "tags": [1, 2],
            "ingredients": [{ "id": 10, "amount": 100 }, { "id": 11, "amount": 5 }],
            "name": "Pancakes",
            "text": "Mix and fry.",
            "cooking_time": 15,
        })
    }

    fn rule_of(result: Result<NewRecipe, ApiError>) -> RecipeRule {
        match result {
            Err(ApiError::Rule(rule)) => rule,
            other => panic!("expected a rule violation, got {other:?}"),
        }
    }

    #[test]
    fn accepts_a_complete_payload() {
        let recipe = form(valid()).validate_new(&RecipeLimits::default()).unwrap();

        assert_eq!(recipe.tags, vec![1, 2]);
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.ingredients[0], IngredientAmount { id: 10, amount: 100 });
        assert!(recipe.image.is_none());
    }

    #[test]
    fn create_requires_every_field() {
        let result = form(json!({ "name": "Soup" })).validate_new(&RecipeLimits::default());

        let Err(ApiError::Validation(errors)) = result else {
            panic!("expected field errors");
        };
        for field in ["tags", "ingredients", "text", "cooking_time"] {
            assert_eq!(errors[field], vec![REQUIRED.to_owned()], "{field}");
        }
        assert!(!errors.contains_key("name"));
    }

    #[test]
    fn rejects_zero_amount_per_line() {
        let mut payload = valid();
        payload["ingredients"][1]["amount"] = json!(0);

        let result = form(payload).validate_new(&RecipeLimits::default());
        let Err(ApiError::Validation(errors)) = result else {
            panic!("expected field errors");
        };
        assert!(errors.contains_key("ingredients"));
    }

    #[test]
    fn amount_is_checked_before_whole_payload_rules() {
        let mut payload = valid();
        payload["tags"] = json!([]);
        payload["ingredients"][0]["amount"] = json!(0);

        let result = form(payload).validate_new(&RecipeLimits::default());
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn rules_are_reported_in_order() {
        let limits = RecipeLimits::default();

        let mut payload = valid();
        payload["tags"] = json!([]);
        payload["name"] = json!("x".repeat(201));
        assert_eq!(rule_of(form(payload).validate_new(&limits)), RecipeRule::EmptyTags);

        let mut payload = valid();
        payload["name"] = json!("x".repeat(201));
        payload["ingredients"] = json!([]);
        assert_eq!(
            rule_of(form(payload).validate_new(&limits)),
            RecipeRule::NameTooLong(200)
        );

        let mut payload = valid();
        payload["ingredients"] = json!([]);
        payload["cooking_time"] = json!(0);
        assert_eq!(
            rule_of(form(payload).validate_new(&limits)),
            RecipeRule::EmptyIngredients
        );

        let mut payload = valid();
        payload["cooking_time"] = json!(0);
        payload["tags"] = json!([1, 1]);
        assert_eq!(
            rule_of(form(payload).validate_new(&limits)),
            RecipeRule::CookingTimeTooShort
        );

        let mut payload = valid();
        payload["tags"] = json!([1, 1]);
        payload["ingredients"] = json!([{ "id": 3, "amount": 1 }, { "id": 3, "amount": 2 }]);
        assert_eq!(
            rule_of(form(payload).validate_new(&limits)),
            RecipeRule::DuplicateTags
        );

        let mut payload = valid();
        payload["ingredients"] = json!([{ "id": 3, "amount": 1 }, { "id": 3, "amount": 2 }]);
        assert_eq!(
            rule_of(form(payload).validate_new(&limits)),
            RecipeRule::DuplicateIngredients
        );
    }

    #[test]
    fn name_length_counts_characters() {
        let limits = RecipeLimits { name_max_length: 5 };
        let mut payload = valid();
        payload["name"] = json!("блины");

        assert!(form(payload).validate_new(&limits).is_ok());
    }

    #[test]
    fn blank_text_is_a_field_error() {
        let mut payload = valid();
        payload["text"] = json!("   ");

        let Err(ApiError::Validation(errors)) =
            form(payload).validate_new(&RecipeLimits::default())
        else {
            panic!("expected field errors");
        };
        assert_eq!(errors["text"], vec![BLANK.to_owned()]);
    }

    #[test]
    fn patch_keeps_absent_collections_untouched() {
        let changes = form(json!({ "tags": [4] }))
            .validate_changes(&RecipeLimits::default())
            .unwrap();

        assert_eq!(changes.tags, Some(vec![4]));
        assert_eq!(changes.ingredients, None);
        assert!(!changes.touches_scalars());

        let changes = form(json!({ "ingredients": [{ "id": 1, "amount": 2 }] }))
            .validate_changes(&RecipeLimits::default())
            .unwrap();
        assert_eq!(changes.tags, None);
        assert!(changes.ingredients.is_some());
    }

    #[test]
    fn patch_still_enforces_rules_on_present_fields() {
        let result = form(json!({ "tags": [] })).validate_changes(&RecipeLimits::default());
        assert!(matches!(result, Err(ApiError::Rule(RecipeRule::EmptyTags))));

        let result = form(json!({ "ingredients": [{ "id": 1, "amount": 1 }, { "id": 1, "amount": 1 }] }))
            .validate_changes(&RecipeLimits::default());
        assert!(matches!(
            result,
            Err(ApiError::Rule(RecipeRule::DuplicateIngredients))
        ));
    }

    #[test]
    fn image_null_clears_and_missing_keeps() {
        let changes = form(json!({ "image": null }))
            .validate_changes(&RecipeLimits::default())
            .unwrap();
        assert_eq!(changes.image, Some(None));
        assert!(changes.touches_scalars());

        let changes = form(json!({})).validate_changes(&RecipeLimits::default()).unwrap();
        assert_eq!(changes.image, None);
    }

    #[test]
    fn image_is_decoded_while_validating() {
        let mut png = Vec::new();
        image::DynamicImage::new_rgb8(1, 1)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let mut payload = valid();
        payload["image"] = json!(format!("data:image/png;base64,{}", STANDARD.encode(&png)));
        let recipe = form(payload).validate_new(&RecipeLimits::default()).unwrap();
        assert!(recipe.image.is_some());

        let mut payload = valid();
        payload["image"] = json!(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(b"\x89PNG\r\n\x1a\nrest")
        ));
        let result = form(payload).validate_new(&RecipeLimits::default());
        assert!(matches!(result, Err(ApiError::Validation(ref e)) if e.contains_key("image")));

        let mut payload = valid();
        payload["image"] = json!("not an image");
        let result = form(payload).validate_new(&RecipeLimits::default());
        let Err(ApiError::Validation(errors)) = result else {
            panic!("expected field errors");
        };
        assert!(errors.contains_key("image"));
    }

    fn registration() -> RegistrationForm {
        RegistrationForm {
            email: "cook@example.com".into(),
            username: "cook.2".into(),
            first_name: "Ada".into(),
            last_name: "Cook".into(),
            password: "secret".into(),
        }
    }

    #[test]
    fn registration_accepts_a_regular_user() {
        assert!(registration().validate().is_ok());
    }

    #[test]
    fn registration_reports_every_bad_field() {
        let form = RegistrationForm {
            email: "not-an-email".into(),
            username: "with space".into(),
            first_name: " ".into(),
            last_name: "x".repeat(USER_NAME_MAX_LENGTH + 1),
            password: String::new(),
        };

        let Err(ApiError::Validation(errors)) = form.validate() else {
            panic!("expected field errors");
        };
        let fields: Vec<&str> = errors.keys().map(String::as_str).collect();
        assert_eq!(
            fields,
            vec!["email", "first_name", "last_name", "password", "username"]
        );
    }

    #[test]
    fn emails() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("a@b@c.de"));
    }

    #[test]
    fn duplicate_detection() {
        assert!(has_duplicates([1, 2, 1]));
        assert!(!has_duplicates([1, 2, 3]));
        assert!(!has_duplicates(Vec::<i32>::new()));
    }
}
