mod assistant;
mod helpers;
mod recipe;
mod transfer;
mod user;

pub(crate) use assistant::{SuggestionOutput, cmd_ask, cmd_chat, cmd_suggest};
pub(crate) use recipe::{
    RecipeFields, cmd_recipe_add, cmd_recipe_delete, cmd_recipe_import, cmd_recipe_list,
    cmd_recipe_search, cmd_recipe_show, cmd_recipe_update,
};
pub(crate) use transfer::{cmd_export, cmd_import};
pub(crate) use user::{
    cmd_user_add, cmd_user_delete, cmd_user_list, cmd_user_login, cmd_user_passwd, cmd_user_role,
};
