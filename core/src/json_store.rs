use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, info};

use crate::error::LarderError;
use crate::models::{NewRecipe, Recipe, UpdateRecipe};
use crate::store::{RecipeStore, StoreKind};

/// Recipes kept as a pretty-printed JSON array in a single file.
///
/// Every mutation rewrites the whole file. Writes land in a sibling temp file
/// first and are renamed over the target, so a crash never leaves a truncated
/// store behind.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<Recipe>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read recipe file: {}", self.path.display()))?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse recipe file: {}", self.path.display()))
    }

    /// Replace the file contents with exactly `recipes`.
    pub fn write_all(&self, recipes: &[Recipe]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(recipes)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write recipe file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace recipe file: {}", self.path.display()))?;
        debug!(path = %self.path.display(), count = recipes.len(), "recipe file written");
        Ok(())
    }

    fn position(recipes: &[Recipe], name: &str) -> Option<usize> {
        let name = name.trim().to_lowercase();
        recipes.iter().position(|r| r.name.to_lowercase() == name)
    }
}

impl RecipeStore for JsonStore {
    fn load(&self) -> Result<Vec<Recipe>> {
        self.read_all()
    }

    fn save(&self, recipes: &[Recipe]) -> Result<()> {
        let mut all = self.read_all()?;
        let now = Local::now().to_rfc3339();
        for recipe in recipes {
            let mut recipe = recipe.clone();
            recipe.name = recipe.name.trim().to_string();
            if recipe.created_at.is_empty() {
                recipe.created_at.clone_from(&now);
            }
            if recipe.updated_at.is_empty() {
                recipe.updated_at.clone_from(&now);
            }
            match Self::position(&all, &recipe.name) {
                Some(idx) => {
                    recipe.created_at.clone_from(&all[idx].created_at);
                    all[idx] = recipe;
                }
                None => all.push(recipe),
            }
        }
        self.write_all(&all)
    }

    fn add(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let mut all = self.read_all()?;
        let name = recipe.name.trim();
        if Self::position(&all, name).is_some() {
            return Err(
                LarderError::Conflict(format!("Recipe '{name}' already exists")).into(),
            );
        }
        let now = Local::now().to_rfc3339();
        let recipe = recipe.clone().into_recipe(&now);
        all.push(recipe.clone());
        self.write_all(&all)?;
        info!(name = %recipe.name, "recipe added");
        Ok(recipe)
    }

    fn get(&self, name: &str) -> Result<Option<Recipe>> {
        let all = self.read_all()?;
        Ok(Self::position(&all, name).map(|idx| all[idx].clone()))
    }

    fn update(&self, name: &str, update: &UpdateRecipe) -> Result<Recipe> {
        let mut all = self.read_all()?;
        let idx = Self::position(&all, name).ok_or_else(|| LarderError::recipe_not_found(name))?;

        if let Some(new_name) = &update.name {
            if let Some(other) = Self::position(&all, new_name) {
                if other != idx {
                    let new_name = new_name.trim();
                    return Err(LarderError::Conflict(format!(
                        "Recipe '{new_name}' already exists"
                    ))
                    .into());
                }
            }
        }

        let now = Local::now().to_rfc3339();
        update.apply(&mut all[idx], &now);
        let recipe = all[idx].clone();
        self.write_all(&all)?;
        info!(name = %recipe.name, "recipe updated");
        Ok(recipe)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let mut all = self.read_all()?;
        let Some(idx) = Self::position(&all, name) else {
            return Ok(false);
        };
        let removed = all.remove(idx);
        self.write_all(&all)?;
        info!(name = %removed.name, "recipe deleted");
        Ok(true)
    }

    fn backend(&self) -> StoreKind {
        StoreKind::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_recipe(name: &str, ingredients: &str) -> NewRecipe {
        NewRecipe {
            name: name.to_string(),
            ingredients: ingredients.to_string(),
            steps: "Cook it.".to_string(),
            image: None,
            video: None,
            owner: "alice".to_string(),
        }
    }

    fn temp_store() -> (tempfile::TempDir, JsonStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("recipes.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let (_dir, store) = temp_store();
        assert!(store.load().unwrap().is_empty());
        assert!(store.get("anything").unwrap().is_none());
    }

    #[test]
    fn test_add_get_and_duplicate() {
        let (_dir, store) = temp_store();
        let added = store.add(&new_recipe("Omelette", "eggs\ncheese")).unwrap();
        assert_eq!(store.get("omelette").unwrap().unwrap(), added);

        let err = store.add(&new_recipe("OMELETTE", "eggs")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LarderError>(),
            Some(LarderError::Conflict(_))
        ));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_dir, store) = temp_store();
        let recipes = vec![
            new_recipe("Omelette", "eggs").into_recipe("2024-01-01T00:00:00+00:00"),
            new_recipe("Salad", "lettuce, tomato").into_recipe("2024-01-02T00:00:00+00:00"),
        ];
        store.save(&recipes).unwrap();
        assert_eq!(store.load().unwrap(), recipes);
    }

    #[test]
    fn test_save_never_drops_unlisted_records() {
        let (_dir, store) = temp_store();
        store.add(&new_recipe("Omelette", "eggs")).unwrap();
        store.add(&new_recipe("Salad", "lettuce")).unwrap();

        let mut salad = store.get("Salad").unwrap().unwrap();
        salad.ingredients = "lettuce\ncucumber".to_string();
        store.save(&[salad]).unwrap();

        let all = store.load().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Omelette");
        assert_eq!(all[1].ingredients, "lettuce\ncucumber");
    }

    #[test]
    fn test_update_and_delete() {
        let (_dir, store) = temp_store();
        store.add(&new_recipe("Omelette", "eggs")).unwrap();
        store.add(&new_recipe("Salad", "lettuce")).unwrap();

        let updated = store
            .update(
                "omelette",
                &UpdateRecipe {
                    name: Some("Cheese Omelette".to_string()),
                    ..UpdateRecipe::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Cheese Omelette");

        let conflict = store.update(
            "Salad",
            &UpdateRecipe {
                name: Some("cheese omelette".to_string()),
                ..UpdateRecipe::default()
            },
        );
        assert!(conflict.is_err());

        assert!(store.delete("Salad").unwrap());
        assert!(!store.delete("Salad").unwrap());
        let names: Vec<String> = store.load().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Cheese Omelette".to_string()]);
    }

    #[test]
    fn test_search_by_name() {
        let (_dir, store) = temp_store();
        store.add(&new_recipe("Tomato Soup", "tomato")).unwrap();
        store.add(&new_recipe("Pancakes", "flour")).unwrap();
        let results = store.search("SOUP").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Tomato Soup");
    }

    #[test]
    fn test_reads_legacy_array() {
        let (_dir, store) = temp_store();
        std::fs::write(
            store.path(),
            r#"[{"name": "Dal", "ingredients": "lentils", "steps": "Boil", "image": "", "video": ""}]"#,
        )
        .unwrap();
        let all = store.load().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].image.is_none());
        assert_eq!(all[0].owner, "");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let (_dir, store) = temp_store();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_err());
    }
}
