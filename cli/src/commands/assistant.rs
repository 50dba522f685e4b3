use anyhow::Result;
use serde::Serialize;
use std::process;

use larder_core::matcher::{Suggestion, ingredient_snippet};
use larder_core::service::RecipeService;

use super::helpers::print_match_table;
use crate::hosted::HostedModelClient;

#[derive(Serialize)]
pub(crate) struct SuggestionResult {
    pub name: String,
    pub score: u32,
    pub ingredients: String,
}

/// JSON shape shared with `GET /api/suggest`.
#[derive(Serialize)]
pub(crate) struct SuggestionOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub results: Vec<SuggestionResult>,
}

impl From<&Suggestion> for SuggestionOutput {
    fn from(suggestion: &Suggestion) -> Self {
        Self {
            message: suggestion.message(),
            results: suggestion
                .matches()
                .iter()
                .map(|m| SuggestionResult {
                    name: m.recipe.name.clone(),
                    score: m.score,
                    ingredients: ingredient_snippet(&m.recipe, 3),
                })
                .collect(),
        }
    }
}

pub(crate) fn cmd_suggest(
    svc: &RecipeService,
    query: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let suggestion = svc.suggest(query, limit)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&SuggestionOutput::from(&suggestion))?
        );
    } else if let Some(message) = suggestion.message() {
        eprintln!("{message}");
    } else {
        print_match_table(suggestion.matches());
    }

    if suggestion.matches().is_empty() {
        process::exit(2);
    }
    Ok(())
}

pub(crate) fn cmd_chat(svc: &RecipeService, query: &str) -> Result<()> {
    println!("{}", svc.chat(query)?);
    Ok(())
}

pub(crate) async fn cmd_ask(
    svc: &RecipeService,
    client: &HostedModelClient,
    query: &str,
) -> Result<()> {
    let recipes = svc.list_recipes()?;
    println!("{}", client.ask(query, &recipes).await);
    Ok(())
}
