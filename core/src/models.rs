use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::LarderError;

pub const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub ingredients: String,
    pub steps: String,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub video: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub owner: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Recipe {
    /// Ingredient entries, split on newlines or commas, trimmed, blanks dropped.
    #[must_use]
    pub fn ingredient_lines(&self) -> Vec<&str> {
        split_ingredients(&self.ingredients)
    }
}

#[must_use]
pub fn split_ingredients(text: &str) -> Vec<&str> {
    text.split(['\n', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

// Older JSON stores wrote "" for missing media and null for a missing owner.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

#[derive(Debug, Clone, Default)]
pub struct NewRecipe {
    pub name: String,
    pub ingredients: String,
    pub steps: String,
    pub image: Option<String>,
    pub video: Option<String>,
    pub owner: String,
}

impl NewRecipe {
    #[must_use]
    pub fn into_recipe(self, now: &str) -> Recipe {
        Recipe {
            name: self.name.trim().to_string(),
            ingredients: self.ingredients,
            steps: self.steps,
            image: self.image.filter(|s| !s.trim().is_empty()),
            video: self.video.filter(|s| !s.trim().is_empty()),
            owner: self.owner,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}

/// Field-wise edit. `image`/`video` use `Some(None)` to clear the attachment.
#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateRecipe {
    pub name: Option<String>,
    pub ingredients: Option<String>,
    pub steps: Option<String>,
    pub image: Option<Option<String>>,
    pub video: Option<Option<String>>,
}

impl UpdateRecipe {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.ingredients.is_none()
            && self.steps.is_none()
            && self.image.is_none()
            && self.video.is_none()
    }

    pub fn apply(&self, recipe: &mut Recipe, now: &str) {
        if let Some(name) = &self.name {
            recipe.name = name.trim().to_string();
        }
        if let Some(ingredients) = &self.ingredients {
            recipe.ingredients.clone_from(ingredients);
        }
        if let Some(steps) = &self.steps {
            recipe.steps.clone_from(steps);
        }
        if let Some(image) = &self.image {
            recipe.image = image.clone().filter(|s| !s.trim().is_empty());
        }
        if let Some(video) = &self.video {
            recipe.video = video.clone().filter(|s| !s.trim().is_empty());
        }
        recipe.updated_at = now.to_string();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LarderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(LarderError::Invalid(format!(
                "Invalid role '{other}'. Must be one of: admin, user"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: String,
}

/// An authenticated caller. Recipes may be changed by their owner or an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub username: String,
    pub role: Role,
}

impl Session {
    /// The operator of the local CLI has full access to their own data directory.
    #[must_use]
    pub fn local(username: &str) -> Self {
        Self {
            username: username.to_string(),
            role: Role::Admin,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    #[must_use]
    pub fn can_edit(&self, recipe: &Recipe) -> bool {
        self.is_admin() || recipe.owner == self.username
    }
}

pub fn validate_recipe_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LarderError::Invalid("Recipe name must not be empty".to_string()).into());
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(LarderError::Invalid(format!(
            "Recipe name must be at most {MAX_NAME_LEN} characters"
        ))
        .into());
    }
    Ok(trimmed.to_string())
}

/// A new recipe needs a name, ingredients, and steps.
pub fn validate_new_recipe(recipe: &NewRecipe) -> Result<()> {
    validate_recipe_name(&recipe.name)?;
    if recipe.ingredients.trim().is_empty() {
        return Err(LarderError::Invalid("Ingredients must not be empty".to_string()).into());
    }
    if recipe.steps.trim().is_empty() {
        return Err(LarderError::Invalid("Steps must not be empty".to_string()).into());
    }
    Ok(())
}

pub fn validate_update(update: &UpdateRecipe) -> Result<()> {
    if update.is_empty() {
        return Err(
            LarderError::Invalid("At least one field must be provided".to_string()).into(),
        );
    }
    if let Some(name) = &update.name {
        validate_recipe_name(name)?;
    }
    if update.ingredients.as_deref().is_some_and(|s| s.trim().is_empty()) {
        return Err(LarderError::Invalid("Ingredients must not be empty".to_string()).into());
    }
    if update.steps.as_deref().is_some_and(|s| s.trim().is_empty()) {
        return Err(LarderError::Invalid("Steps must not be empty".to_string()).into());
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<String> {
    let trimmed = username.trim();
    if trimmed.is_empty() || trimmed.len() > 64 {
        return Err(
            LarderError::Invalid("Username must be 1-64 characters".to_string()).into(),
        );
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(LarderError::Invalid(format!(
            "Invalid username '{trimmed}'. Use letters, digits, '_', '-' or '.'"
        ))
        .into());
    }
    Ok(trimmed.to_string())
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(LarderError::Invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ))
        .into());
    }
    Ok(())
}
