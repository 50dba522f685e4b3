use std::fmt;
use std::str::FromStr;

use anyhow::Result;

use crate::error::LarderError;
use crate::models::{NewRecipe, Recipe, UpdateRecipe};

/// Durable list of recipes keyed by (case-insensitive) name.
///
/// `save` upserts by name and never removes records missing from the slice;
/// removal always goes through `delete`.
pub trait RecipeStore: Send {
    /// All recipes, in insertion order.
    fn load(&self) -> Result<Vec<Recipe>>;

    fn save(&self, recipes: &[Recipe]) -> Result<()>;

    /// Insert a new recipe. A name already in the store is a `Conflict`.
    fn add(&self, recipe: &NewRecipe) -> Result<Recipe>;

    fn get(&self, name: &str) -> Result<Option<Recipe>>;

    fn update(&self, name: &str, update: &UpdateRecipe) -> Result<Recipe>;

    /// Returns false when no recipe had that name.
    fn delete(&self, name: &str) -> Result<bool>;

    /// Case-insensitive substring match on recipe names.
    fn search(&self, query: &str) -> Result<Vec<Recipe>> {
        let needle = query.trim().to_lowercase();
        let recipes = self.load()?;
        Ok(recipes
            .into_iter()
            .filter(|r| r.name.to_lowercase().contains(&needle))
            .collect())
    }

    fn backend(&self) -> StoreKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Sqlite,
    Json,
}

impl StoreKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = LarderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "db" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            other => Err(LarderError::Invalid(format!(
                "Invalid store '{other}'. Must be one of: sqlite, json"
            ))),
        }
    }
}
