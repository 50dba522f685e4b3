use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process;

use larder_core::models::{NewRecipe, Session, UpdateRecipe};
use larder_core::service::RecipeService;

use super::helpers::{json_error, print_recipe_table};
use crate::config::Config;
use crate::media::{StagedMedia, remove_media, stage_media};

pub(crate) struct RecipeFields {
    pub name: Option<String>,
    pub ingredients: Option<String>,
    pub steps: Option<String>,
    pub image: Option<String>,
    pub video: Option<String>,
}

pub(crate) fn cmd_recipe_add(
    svc: &RecipeService,
    config: &Config,
    session: &Session,
    name: &str,
    fields: RecipeFields,
    owner: Option<String>,
    json: bool,
) -> Result<()> {
    if svc.get_recipe(name).is_ok() {
        bail!("Recipe '{name}' already exists");
    }
    let media_dir = config.media_dir();
    let image = fields
        .image
        .map(|src| stage_media(&media_dir, name, &src))
        .transpose()?;
    let video = fields
        .video
        .map(|src| stage_media(&media_dir, name, &src))
        .transpose()?;

    let recipe = svc.add_recipe(
        session,
        NewRecipe {
            name: name.to_string(),
            ingredients: fields.ingredients.unwrap_or_default(),
            steps: fields.steps.unwrap_or_default(),
            image: image.as_ref().map(|m| m.stored.clone()),
            video: video.as_ref().map(|m| m.stored.clone()),
            owner: owner.unwrap_or_default(),
        },
    )?;
    for staged in [&image, &video].into_iter().flatten() {
        staged.commit()?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let count = recipe.ingredient_lines().len();
        println!("Added recipe: {} ({count} ingredients)", recipe.name);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(svc: &RecipeService, json: bool) -> Result<()> {
    let recipes = svc.list_recipes()?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
    } else {
        print_recipe_table(&recipes);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_search(svc: &RecipeService, query: &str, json: bool) -> Result<()> {
    let recipes = svc.search_recipes(query)?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes matching '{query}'");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
    } else {
        print_recipe_table(&recipes);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(svc: &RecipeService, name: &str, json: bool) -> Result<()> {
    let recipe = svc.get_recipe(name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    println!("=== {} ===", recipe.name);
    if !recipe.owner.is_empty() {
        println!("  Owner: {}", recipe.owner);
    }
    println!("\n  INGREDIENTS:");
    for line in recipe.ingredient_lines() {
        println!("    - {line}");
    }
    println!("\n  STEPS:");
    for line in recipe.steps.lines() {
        println!("    {line}");
    }
    if let Some(image) = &recipe.image {
        println!("\n  Image: {image}");
    }
    if let Some(video) = &recipe.video {
        println!("  Video: {video}");
    }
    Ok(())
}

fn stored_value(staged: Option<&Option<StagedMedia>>) -> Option<Option<String>> {
    staged.map(|m| m.as_ref().map(|m| m.stored.clone()))
}

pub(crate) fn cmd_recipe_update(
    svc: &RecipeService,
    config: &Config,
    session: &Session,
    name: &str,
    fields: RecipeFields,
    json: bool,
) -> Result<()> {
    let existing = svc.get_recipe(name)?;
    let media_dir = config.media_dir();
    let target_name = fields.name.as_deref().unwrap_or(&existing.name);

    // "" clears the field
    let attach = |src: String| -> Result<Option<StagedMedia>> {
        if src.trim().is_empty() {
            Ok(None)
        } else {
            stage_media(&media_dir, target_name, &src).map(Some)
        }
    };
    let image = fields.image.map(&attach).transpose()?;
    let video = fields.video.map(&attach).transpose()?;
    let update = UpdateRecipe {
        name: fields.name.clone(),
        ingredients: fields.ingredients,
        steps: fields.steps,
        image: stored_value(image.as_ref()),
        video: stored_value(video.as_ref()),
    };
    if update.is_empty() {
        bail!("Nothing to update. Pass at least one of --name, --ingredients, --steps, --image, --video");
    }

    let recipe = svc.update_recipe(session, name, &update)?;
    for staged in [&image, &video].into_iter().flatten().flatten() {
        staged.commit()?;
    }

    for (old, new) in [(&existing.image, &recipe.image), (&existing.video, &recipe.video)] {
        if let Some(old) = old.as_ref().filter(|old| new.as_ref() != Some(*old)) {
            remove_media(&media_dir, old)?;
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        println!("Updated recipe: {}", recipe.name);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(
    svc: &RecipeService,
    config: &Config,
    session: &Session,
    name: &str,
    json: bool,
) -> Result<()> {
    let recipe = match svc.delete_recipe(session, name) {
        Ok(recipe) => recipe,
        Err(e)
            if matches!(
                e.downcast_ref::<larder_core::error::LarderError>(),
                Some(larder_core::error::LarderError::NotFound(_))
            ) =>
        {
            if json {
                println!("{}", json_error(&e.to_string()));
            } else {
                eprintln!("{e}");
            }
            process::exit(2);
        }
        Err(e) => return Err(e),
    };

    let media_dir = config.media_dir();
    for stored in [&recipe.image, &recipe.video].into_iter().flatten() {
        remove_media(&media_dir, stored)?;
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": recipe.name }));
    } else {
        println!("Deleted recipe: {}", recipe.name);
    }
    Ok(())
}

/// A Cooklang file reduced to the plain text the store keeps.
#[derive(Debug)]
pub(crate) struct ImportedRecipe {
    pub title: Option<String>,
    pub ingredients: String,
    pub steps: String,
}

pub(crate) fn parse_cooklang(input: &str) -> Result<ImportedRecipe> {
    let (recipe, _report) = cooklang::parse(input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let converter = cooklang::Converter::default();
    let ingredients: Vec<String> = recipe
        .group_ingredients(&converter)
        .iter()
        .map(|gi| {
            let name = gi.ingredient.display_name();
            match gi.quantity.iter().next().map(quantity_text) {
                Some(qty) if !qty.is_empty() => format!("{qty} {name}"),
                _ => name.to_string(),
            }
        })
        .collect();

    let mut steps = Vec::new();
    for section in &recipe.sections {
        for content in &section.content {
            let cooklang::Content::Step(step) = content else {
                continue;
            };
            let mut text = String::new();
            for item in &step.items {
                match item {
                    cooklang::Item::Text { value } => text.push_str(value),
                    cooklang::Item::Ingredient { index } => {
                        text.push_str(&recipe.ingredients[*index].display_name());
                    }
                    cooklang::Item::Cookware { index } => {
                        text.push_str(&recipe.cookware[*index].name);
                    }
                    cooklang::Item::Timer { index } => {
                        if let Some(qty) = &recipe.timers[*index].quantity {
                            text.push_str(&quantity_text(qty));
                        }
                    }
                    cooklang::Item::InlineQuantity { index } => {
                        text.push_str(&quantity_text(&recipe.inline_quantities[*index]));
                    }
                    #[allow(unreachable_patterns)]
                    _ => {}
                }
            }
            let text = text.trim();
            if !text.is_empty() {
                steps.push(format!("{}. {text}", steps.len() + 1));
            }
        }
    }

    Ok(ImportedRecipe {
        title: recipe.metadata.title().map(String::from),
        ingredients: ingredients.join("\n"),
        steps: steps.join("\n"),
    })
}

fn quantity_text(qty: &cooklang::Quantity) -> String {
    let value = match qty.value() {
        cooklang::Value::Number(n) => n.value().to_string(),
        cooklang::Value::Range { start, end } => {
            format!("{}-{}", start.value(), end.value())
        }
        cooklang::Value::Text(t) => t.clone(),
    };
    match qty.unit() {
        Some(unit) => format!("{value} {unit}"),
        None => value,
    }
}

pub(crate) fn cmd_recipe_import(
    svc: &RecipeService,
    session: &Session,
    file: &Path,
    name_override: Option<String>,
    owner: Option<String>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let imported = parse_cooklang(&input)?;

    let name = name_override
        .or(imported.title)
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe name. Use --name to specify one")?;

    if imported.ingredients.is_empty() {
        bail!("No ingredients found in recipe");
    }

    let recipe = svc.add_recipe(
        session,
        NewRecipe {
            name,
            ingredients: imported.ingredients,
            steps: imported.steps,
            owner: owner.unwrap_or_default(),
            ..NewRecipe::default()
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let count = recipe.ingredient_lines().len();
        println!("Imported recipe: {} ({count} ingredients)", recipe.name);
    }
    Ok(())
}
