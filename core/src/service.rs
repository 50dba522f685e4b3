use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::assistant;
use crate::auth::{self, hash_password};
use crate::db::Database;
use crate::error::LarderError;
use crate::json_store::JsonStore;
use crate::matcher::{self, MatchOptions, Suggestion};
use crate::models::{
    NewRecipe, Recipe, Role, Session, UpdateRecipe, User, validate_new_recipe, validate_password,
    validate_update, validate_username,
};
use crate::store::{RecipeStore, StoreKind};

pub const DB_FILE: &str = "larder.db";
pub const JSON_FILE: &str = "recipes.json";

/// Recipe and user operations shared by the CLI and the REST server.
///
/// Recipes live in whichever [`RecipeStore`] was chosen; users always live in
/// the SQLite database.
pub struct RecipeService {
    store: Box<dyn RecipeStore>,
    users: Database,
    options: MatchOptions,
}

fn forbidden(message: &str) -> anyhow::Error {
    LarderError::Forbidden(message.to_string()).into()
}

impl RecipeService {
    pub fn new(store: Box<dyn RecipeStore>, users: Database) -> Self {
        Self {
            store,
            users,
            options: MatchOptions::default(),
        }
    }

    /// Open the stores under `data_dir`: `larder.db` always, `recipes.json`
    /// when the JSON backend is selected.
    pub fn open(data_dir: &Path, kind: StoreKind) -> Result<Self> {
        let users = Database::open(&data_dir.join(DB_FILE))?;
        let store: Box<dyn RecipeStore> = match kind {
            StoreKind::Sqlite => Box::new(Database::open(&data_dir.join(DB_FILE))?),
            StoreKind::Json => Box::new(JsonStore::new(data_dir.join(JSON_FILE))),
        };
        Ok(Self::new(store, users))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(
            Box::new(Database::open_in_memory()?),
            Database::open_in_memory()?,
        ))
    }

    #[must_use]
    pub fn with_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn backend(&self) -> StoreKind {
        self.store.backend()
    }

    // --- Recipes ---

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        self.store.load()
    }

    pub fn get_recipe(&self, name: &str) -> Result<Recipe> {
        self.store
            .get(name)?
            .ok_or_else(|| LarderError::recipe_not_found(name).into())
    }

    pub fn search_recipes(&self, query: &str) -> Result<Vec<Recipe>> {
        self.store.search(query)
    }

    /// Add a recipe. An empty owner defaults to the caller; only admins may
    /// create recipes on someone else's behalf.
    pub fn add_recipe(&self, session: &Session, mut recipe: NewRecipe) -> Result<Recipe> {
        validate_new_recipe(&recipe)?;
        if recipe.owner.trim().is_empty() {
            recipe.owner.clone_from(&session.username);
        } else if recipe.owner != session.username && !session.is_admin() {
            return Err(forbidden("Only admins can add recipes for other users"));
        }
        self.store.add(&recipe)
    }

    pub fn update_recipe(
        &self,
        session: &Session,
        name: &str,
        update: &UpdateRecipe,
    ) -> Result<Recipe> {
        validate_update(update)?;
        let existing = self.get_recipe(name)?;
        if !session.can_edit(&existing) {
            return Err(forbidden(&format!(
                "Recipe '{}' belongs to another user",
                existing.name
            )));
        }
        self.store.update(&existing.name, update)
    }

    /// Delete one recipe by name and return it.
    pub fn delete_recipe(&self, session: &Session, name: &str) -> Result<Recipe> {
        let existing = self.get_recipe(name)?;
        if !session.can_edit(&existing) {
            return Err(forbidden(&format!(
                "Recipe '{}' belongs to another user",
                existing.name
            )));
        }
        if !self.store.delete(&existing.name)? {
            return Err(LarderError::recipe_not_found(name).into());
        }
        Ok(existing)
    }

    // --- Assistant ---

    pub fn suggest(&self, query: &str, limit: Option<usize>) -> Result<Suggestion> {
        let recipes = self.store.load()?;
        let mut options = self.options;
        if let Some(limit) = limit {
            options.limit = limit.max(1);
        }
        Ok(matcher::suggest(query, &recipes, &options))
    }

    pub fn chat(&self, query: &str) -> Result<String> {
        let recipes = self.store.load()?;
        Ok(assistant::reply(query, &recipes, &self.options))
    }

    // --- Transfer between backends ---

    pub fn export_json(&self, path: &Path) -> Result<usize> {
        let recipes = self.store.load()?;
        JsonStore::new(path).write_all(&recipes)?;
        info!(path = %path.display(), count = recipes.len(), "recipes exported");
        Ok(recipes.len())
    }

    /// Upsert every recipe from a JSON array file; existing records not in the
    /// file are left alone.
    pub fn import_json(&self, path: &Path) -> Result<usize> {
        if !path.exists() {
            return Err(
                LarderError::NotFound(format!("File not found: {}", path.display())).into(),
            );
        }
        let recipes = JsonStore::new(path).load()?;
        for recipe in &recipes {
            validate_new_recipe(&NewRecipe {
                name: recipe.name.clone(),
                ingredients: recipe.ingredients.clone(),
                steps: recipe.steps.clone(),
                ..NewRecipe::default()
            })?;
        }
        self.store.save(&recipes)?;
        info!(path = %path.display(), count = recipes.len(), "recipes imported");
        Ok(recipes.len())
    }

    // --- Users ---

    pub fn login(&self, username: &str, password: &str) -> Result<Option<Session>> {
        auth::authenticate(&self.users, username, password)
    }

    pub fn has_users(&self) -> Result<bool> {
        Ok(self.users.count_users()? > 0)
    }

    /// Create a user. The very first account is always an admin and needs no
    /// caller; after that only admins may create accounts.
    pub fn create_user(
        &self,
        actor: Option<&Session>,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<User> {
        let username = validate_username(username)?;
        validate_password(password)?;
        let first = !self.has_users()?;
        if !first && !actor.is_some_and(Session::is_admin) {
            return Err(forbidden("Only admins can create users"));
        }
        let role = if first { Role::Admin } else { role };
        self.users
            .create_user(&username, &hash_password(password), role)
    }

    /// Create `username` as an admin when there are no users yet.
    pub fn ensure_admin(&self, username: &str, password: &str) -> Result<bool> {
        if self.has_users()? {
            return Ok(false);
        }
        self.create_user(None, username, password, Role::Admin)?;
        Ok(true)
    }

    pub fn list_users(&self, actor: &Session) -> Result<Vec<User>> {
        if !actor.is_admin() {
            return Err(forbidden("Only admins can list users"));
        }
        self.users.list_users()
    }

    pub fn delete_user(&self, actor: &Session, username: &str) -> Result<()> {
        if !actor.is_admin() {
            return Err(forbidden("Only admins can delete users"));
        }
        let user = self
            .users
            .get_user(username)?
            .ok_or_else(|| LarderError::user_not_found(username))?;
        if user.role == Role::Admin && self.users.count_admins()? <= 1 {
            return Err(LarderError::Conflict("Cannot delete the last admin".to_string()).into());
        }
        self.users.delete_user(&user.username)?;
        info!(username = %user.username, "user deleted");
        Ok(())
    }

    /// Users may change their own password; admins may change anyone's.
    pub fn set_password(&self, actor: &Session, username: &str, password: &str) -> Result<()> {
        if !actor.is_admin() && !actor.username.eq_ignore_ascii_case(username) {
            return Err(forbidden("Only admins can change other users' passwords"));
        }
        validate_password(password)?;
        if !self
            .users
            .set_password_hash(username, &hash_password(password))?
        {
            return Err(LarderError::user_not_found(username).into());
        }
        Ok(())
    }

    pub fn set_role(&self, actor: &Session, username: &str, role: Role) -> Result<()> {
        if !actor.is_admin() {
            return Err(forbidden("Only admins can change roles"));
        }
        let user = self
            .users
            .get_user(username)?
            .ok_or_else(|| LarderError::user_not_found(username))?;
        if user.role == Role::Admin && role == Role::User && self.users.count_admins()? <= 1 {
            return Err(LarderError::Conflict("Cannot demote the last admin".to_string()).into());
        }
        self.users.set_role(&user.username, role)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> Session {
        Session {
            username: name.to_string(),
            role: Role::User,
        }
    }

    fn admin() -> Session {
        Session {
            username: "root".to_string(),
            role: Role::Admin,
        }
    }

    fn soup() -> NewRecipe {
        NewRecipe {
            name: "Tomato Soup".to_string(),
            ingredients: "tomato\nonion\nsalt".to_string(),
            steps: "Simmer.".to_string(),
            ..NewRecipe::default()
        }
    }

    fn kind_of(err: &anyhow::Error) -> Option<&LarderError> {
        err.downcast_ref::<LarderError>()
    }

    #[test]
    fn test_add_recipe_defaults_owner_to_caller() {
        let svc = RecipeService::new_in_memory().unwrap();
        let recipe = svc.add_recipe(&user("alice"), soup()).unwrap();
        assert_eq!(recipe.owner, "alice");
    }

    #[test]
    fn test_add_recipe_for_other_owner_requires_admin() {
        let svc = RecipeService::new_in_memory().unwrap();
        let mut recipe = soup();
        recipe.owner = "bob".to_string();
        let err = svc.add_recipe(&user("alice"), recipe.clone()).unwrap_err();
        assert!(matches!(kind_of(&err), Some(LarderError::Forbidden(_))));

        let added = svc.add_recipe(&admin(), recipe).unwrap();
        assert_eq!(added.owner, "bob");
    }

    #[test]
    fn test_add_recipe_validates_fields() {
        let svc = RecipeService::new_in_memory().unwrap();
        let mut recipe = soup();
        recipe.ingredients = String::new();
        let err = svc.add_recipe(&user("alice"), recipe).unwrap_err();
        assert!(matches!(kind_of(&err), Some(LarderError::Invalid(_))));
    }

    #[test]
    fn test_only_owner_or_admin_may_edit() {
        let svc = RecipeService::new_in_memory().unwrap();
        svc.add_recipe(&user("alice"), soup()).unwrap();
        let update = UpdateRecipe {
            steps: Some("Blend.".to_string()),
            ..UpdateRecipe::default()
        };

        let err = svc
            .update_recipe(&user("bob"), "tomato soup", &update)
            .unwrap_err();
        assert!(matches!(kind_of(&err), Some(LarderError::Forbidden(_))));

        let updated = svc
            .update_recipe(&user("alice"), "tomato soup", &update)
            .unwrap();
        assert_eq!(updated.steps, "Blend.");

        let err = svc.delete_recipe(&user("bob"), "Tomato Soup").unwrap_err();
        assert!(matches!(kind_of(&err), Some(LarderError::Forbidden(_))));
        let deleted = svc.delete_recipe(&admin(), "Tomato Soup").unwrap();
        assert_eq!(deleted.name, "Tomato Soup");
        assert!(svc.list_recipes().unwrap().is_empty());
    }

    #[test]
    fn test_get_missing_recipe_is_not_found() {
        let svc = RecipeService::new_in_memory().unwrap();
        let err = svc.get_recipe("nothing").unwrap_err();
        assert!(matches!(kind_of(&err), Some(LarderError::NotFound(_))));
        let err = svc.delete_recipe(&admin(), "nothing").unwrap_err();
        assert!(matches!(kind_of(&err), Some(LarderError::NotFound(_))));
    }

    #[test]
    fn test_suggest_and_chat() {
        let svc = RecipeService::new_in_memory().unwrap();
        assert_eq!(svc.suggest("tomato", None).unwrap(), Suggestion::NoRecipes);

        svc.add_recipe(&user("alice"), soup()).unwrap();
        let suggestion = svc.suggest("I have tomato and onion", Some(3)).unwrap();
        assert_eq!(suggestion.matches().len(), 1);
        assert_eq!(suggestion.matches()[0].score, 2);

        let reply = svc.chat("how do I make tomato soup?").unwrap();
        assert!(reply.contains("Simmer."));
    }

    #[test]
    fn test_first_user_is_admin_then_admin_only() {
        let svc = RecipeService::new_in_memory().unwrap();
        let first = svc
            .create_user(None, "alice", "wonderland", Role::User)
            .unwrap();
        assert_eq!(first.role, Role::Admin);

        let err = svc
            .create_user(None, "bob", "builder1", Role::User)
            .unwrap_err();
        assert!(matches!(kind_of(&err), Some(LarderError::Forbidden(_))));

        let alice = svc.login("alice", "wonderland").unwrap().unwrap();
        let bob = svc
            .create_user(Some(&alice), "bob", "builder1", Role::User)
            .unwrap();
        assert_eq!(bob.role, Role::User);
        assert!(svc.login("bob", "wrong").unwrap().is_none());
    }

    #[test]
    fn test_ensure_admin_only_on_empty_user_store() {
        let svc = RecipeService::new_in_memory().unwrap();
        assert!(svc.ensure_admin("admin", "changeme").unwrap());
        assert!(!svc.ensure_admin("admin2", "changeme").unwrap());
        assert_eq!(svc.list_users(&admin()).unwrap().len(), 1);
    }

    #[test]
    fn test_cannot_delete_or_demote_last_admin() {
        let svc = RecipeService::new_in_memory().unwrap();
        svc.create_user(None, "alice", "wonderland", Role::Admin)
            .unwrap();
        let err = svc.delete_user(&admin(), "alice").unwrap_err();
        assert!(matches!(kind_of(&err), Some(LarderError::Conflict(_))));
        let err = svc.set_role(&admin(), "alice", Role::User).unwrap_err();
        assert!(matches!(kind_of(&err), Some(LarderError::Conflict(_))));
    }

    #[test]
    fn test_set_password_self_or_admin() {
        let svc = RecipeService::new_in_memory().unwrap();
        svc.create_user(None, "alice", "wonderland", Role::Admin)
            .unwrap();
        let alice = svc.login("alice", "wonderland").unwrap().unwrap();
        svc.create_user(Some(&alice), "bob", "builder1", Role::User)
            .unwrap();

        let bob = svc.login("bob", "builder1").unwrap().unwrap();
        assert!(svc.set_password(&bob, "alice", "hacked!").is_err());
        svc.set_password(&bob, "bob", "builder2").unwrap();
        assert!(svc.login("bob", "builder2").unwrap().is_some());

        svc.set_password(&alice, "bob", "reset-by-admin").unwrap();
        assert!(svc.login("bob", "reset-by-admin").unwrap().is_some());
        assert!(svc.list_users(&bob).is_err());
    }

    #[test]
    fn test_open_json_backend_and_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let json_svc = RecipeService::open(dir.path(), StoreKind::Json).unwrap();
        assert_eq!(json_svc.backend(), StoreKind::Json);
        json_svc.add_recipe(&user("alice"), soup()).unwrap();
        assert!(dir.path().join(JSON_FILE).exists());

        let export = dir.path().join("export.json");
        assert_eq!(json_svc.export_json(&export).unwrap(), 1);

        let sqlite_svc = RecipeService::open(dir.path(), StoreKind::Sqlite).unwrap();
        assert!(sqlite_svc.list_recipes().unwrap().is_empty());
        assert_eq!(sqlite_svc.import_json(&export).unwrap(), 1);
        let imported = sqlite_svc.get_recipe("Tomato Soup").unwrap();
        assert_eq!(imported.owner, "alice");
        assert_eq!(imported, json_svc.get_recipe("Tomato Soup").unwrap());
    }

    #[test]
    fn test_export_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export.json");
        std::fs::write(
            &export,
            r#"[{"name":"Stale","ingredients":"x","steps":"y","owner":"old"}]"#,
        )
        .unwrap();

        let svc = RecipeService::new_in_memory().unwrap();
        svc.add_recipe(&user("alice"), soup()).unwrap();
        assert_eq!(svc.export_json(&export).unwrap(), 1);

        let written = JsonStore::new(&export).load().unwrap();
        let names: Vec<&str> = written.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Tomato Soup"]);

        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "not json").unwrap();
        assert_eq!(svc.export_json(&notes).unwrap(), 1);
        assert_eq!(JsonStore::new(&notes).load().unwrap().len(), 1);
    }

    #[test]
    fn test_import_missing_file() {
        let svc = RecipeService::new_in_memory().unwrap();
        let err = svc.import_json(Path::new("/nonexistent/recipes.json")).unwrap_err();
        assert!(matches!(kind_of(&err), Some(LarderError::NotFound(_))));
    }
}
