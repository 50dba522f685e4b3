use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::LarderError;
use crate::models::{NewRecipe, Recipe, Role, UpdateRecipe, User};
use crate::store::{RecipeStore, StoreKind};

const RECIPE_COLUMNS: &str =
    "name, ingredients, steps, image, video, owner, created_at, updated_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            // Databases written by earlier releases already have this table
            // (without timestamps), so keep the original column set here.
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT UNIQUE COLLATE NOCASE,
                    ingredients TEXT,
                    steps TEXT,
                    image TEXT,
                    video TEXT,
                    owner TEXT
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            let now = Local::now().to_rfc3339();
            self.conn.execute_batch(
                "ALTER TABLE recipes ADD COLUMN created_at TEXT;
                 ALTER TABLE recipes ADD COLUMN updated_at TEXT;

                 CREATE TABLE IF NOT EXISTS users (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     username TEXT NOT NULL UNIQUE COLLATE NOCASE,
                     password_hash TEXT NOT NULL,
                     role TEXT NOT NULL CHECK (role IN ('admin', 'user')),
                     created_at TEXT NOT NULL
                 );",
            )?;
            self.conn.execute(
                "UPDATE recipes SET created_at = ?1, updated_at = ?1 WHERE created_at IS NULL",
                params![now],
            )?;
            self.conn.execute_batch("PRAGMA user_version = 2;")?;
        }

        if version < 3 {
            self.rebuild_recipes_nocase()?;
        }

        Ok(())
    }

    /// Older databases declared `name TEXT UNIQUE` without NOCASE, so they may
    /// hold names differing only in case. Later rows get a " (n)" suffix
    /// before the table is rebuilt with a case-insensitive unique name.
    fn rebuild_recipes_nocase(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stmt =
            tx.prepare("SELECT id, name FROM recipes WHERE name IS NOT NULL ORDER BY id")?;
        let rows: Vec<(i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let mut taken: HashSet<String> = rows.iter().map(|(_, n)| n.to_lowercase()).collect();
        let mut kept: HashSet<String> = HashSet::new();
        for (id, name) in &rows {
            if kept.insert(name.to_lowercase()) {
                continue;
            }
            let renamed = (2..)
                .map(|n| format!("{name} ({n})"))
                .find(|candidate| !taken.contains(&candidate.to_lowercase()))
                .unwrap_or_else(|| format!("{name} ({id})"));
            taken.insert(renamed.to_lowercase());
            kept.insert(renamed.to_lowercase());
            tx.execute(
                "UPDATE recipes SET name = ?1 WHERE id = ?2",
                params![renamed, id],
            )?;
            warn!(%name, %renamed, "renamed recipe whose name clashed by case");
        }

        tx.execute_batch(
            "CREATE TABLE recipes_nocase (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE COLLATE NOCASE,
                ingredients TEXT,
                steps TEXT,
                image TEXT,
                video TEXT,
                owner TEXT,
                created_at TEXT,
                updated_at TEXT
            );
            INSERT INTO recipes_nocase
                (id, name, ingredients, steps, image, video, owner, created_at, updated_at)
            SELECT id, name, ingredients, steps, image, video, owner, created_at, updated_at
            FROM recipes;
            DROP TABLE recipes;
            ALTER TABLE recipes_nocase RENAME TO recipes;

            PRAGMA user_version = 3;",
        )?;
        tx.commit()?;
        Ok(())
    }

    // --- Row mapping helpers ---

    // Legacy rows may carry NULL or "" in any text column.
    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Ok(Recipe {
            name: row.get(0)?,
            ingredients: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            steps: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            image: non_empty(row.get(3)?),
            video: non_empty(row.get(4)?),
            owner: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            created_at: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            updated_at: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        })
    }

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let role: String = row.get(3)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            role: role.parse().unwrap_or(Role::User),
            created_at: row.get(4)?,
        })
    }

    // --- Recipes ---

    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let name = recipe.name.trim();
        if self.get_recipe(name)?.is_some() {
            return Err(
                LarderError::Conflict(format!("Recipe '{name}' already exists")).into(),
            );
        }
        let now = Local::now().to_rfc3339();
        let recipe = recipe.clone().into_recipe(&now);
        self.conn.execute(
            &format!(
                "INSERT INTO recipes ({RECIPE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                recipe.name,
                recipe.ingredients,
                recipe.steps,
                recipe.image,
                recipe.video,
                recipe.owner,
                recipe.created_at,
                recipe.updated_at,
            ],
        )?;
        info!(name = %recipe.name, "recipe added");
        Ok(recipe)
    }

    pub fn get_recipe(&self, name: &str) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE name = ?1"),
                params![name.trim()],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY id"))?;
        let recipes = stmt
            .query_map([], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn search_recipes(&self, query: &str) -> Result<Vec<Recipe>> {
        let escaped = query
            .trim()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE name LIKE ?1 ESCAPE '\\' ORDER BY id"
        ))?;
        let recipes = stmt
            .query_map(params![pattern], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn update_recipe(&self, name: &str, update: &UpdateRecipe) -> Result<Recipe> {
        let mut recipe = self
            .get_recipe(name)?
            .ok_or_else(|| LarderError::recipe_not_found(name))?;
        let old_name = recipe.name.clone();

        if let Some(new_name) = &update.name {
            let new_name = new_name.trim();
            if !new_name.eq_ignore_ascii_case(&old_name) && self.get_recipe(new_name)?.is_some() {
                return Err(
                    LarderError::Conflict(format!("Recipe '{new_name}' already exists")).into(),
                );
            }
        }

        let now = Local::now().to_rfc3339();
        update.apply(&mut recipe, &now);
        self.conn.execute(
            "UPDATE recipes SET name = ?1, ingredients = ?2, steps = ?3, image = ?4, video = ?5,
             updated_at = ?6 WHERE name = ?7",
            params![
                recipe.name,
                recipe.ingredients,
                recipe.steps,
                recipe.image,
                recipe.video,
                recipe.updated_at,
                old_name,
            ],
        )?;
        info!(name = %recipe.name, "recipe updated");
        Ok(recipe)
    }

    pub fn delete_recipe(&self, name: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM recipes WHERE name = ?1",
            params![name.trim()],
        )?;
        if rows > 0 {
            info!(name = %name.trim(), "recipe deleted");
        }
        Ok(rows > 0)
    }

    /// Upsert every recipe by name inside one transaction.
    pub fn upsert_recipes(&self, recipes: &[Recipe]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Local::now().to_rfc3339();
        for recipe in recipes {
            let created_at = if recipe.created_at.is_empty() {
                now.as_str()
            } else {
                recipe.created_at.as_str()
            };
            let updated_at = if recipe.updated_at.is_empty() {
                now.as_str()
            } else {
                recipe.updated_at.as_str()
            };
            tx.execute(
                &format!(
                    "INSERT INTO recipes ({RECIPE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(name) DO UPDATE SET
                        ingredients = excluded.ingredients,
                        steps = excluded.steps,
                        image = excluded.image,
                        video = excluded.video,
                        owner = excluded.owner,
                        updated_at = excluded.updated_at"
                ),
                params![
                    recipe.name.trim(),
                    recipe.ingredients,
                    recipe.steps,
                    recipe.image,
                    recipe.video,
                    recipe.owner,
                    created_at,
                    updated_at,
                ],
            )?;
        }
        tx.commit()?;
        debug!(count = recipes.len(), "recipes saved");
        Ok(())
    }

    // --- Users ---

    pub fn create_user(&self, username: &str, password_hash: &str, role: Role) -> Result<User> {
        if self.get_user(username)?.is_some() {
            return Err(
                LarderError::Conflict(format!("User '{username}' already exists")).into(),
            );
        }
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (username, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![username, password_hash, role.as_str(), now],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(%username, %role, "user created");
        Ok(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: now,
        })
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, password_hash, role, created_at FROM users
                 WHERE LOWER(username) = LOWER(?1)",
                params![username.trim()],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, password_hash, role, created_at FROM users ORDER BY username",
        )?;
        let users = stmt
            .query_map([], Self::user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn count_users(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_admins(&self) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = 'admin'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn set_password_hash(&self, username: &str, password_hash: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE LOWER(username) = LOWER(?2)",
            params![password_hash, username],
        )?;
        Ok(rows > 0)
    }

    pub fn set_role(&self, username: &str, role: Role) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET role = ?1 WHERE LOWER(username) = LOWER(?2)",
            params![role.as_str(), username],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM users WHERE LOWER(username) = LOWER(?1)",
            params![username],
        )?;
        Ok(rows > 0)
    }
}

impl RecipeStore for Database {
    fn load(&self) -> Result<Vec<Recipe>> {
        self.list_recipes()
    }

    fn save(&self, recipes: &[Recipe]) -> Result<()> {
        self.upsert_recipes(recipes)
    }

    fn add(&self, recipe: &NewRecipe) -> Result<Recipe> {
        self.insert_recipe(recipe)
    }

    fn get(&self, name: &str) -> Result<Option<Recipe>> {
        self.get_recipe(name)
    }

    fn update(&self, name: &str, update: &UpdateRecipe) -> Result<Recipe> {
        self.update_recipe(name, update)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        self.delete_recipe(name)
    }

    fn search(&self, query: &str) -> Result<Vec<Recipe>> {
        self.search_recipes(query)
    }

    fn backend(&self) -> StoreKind {
        StoreKind::Sqlite
    }
}
