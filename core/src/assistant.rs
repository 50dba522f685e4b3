//! Rule-based chat front-end over the matcher.
//!
//! A query is classified into a handful of intents by keyword; anything that
//! is not a greeting, a listing request, or a "how do I make X" question is
//! treated as a list of ingredients and handed to [`matcher::suggest`].

use crate::matcher::{self, MatchOptions, NO_RECIPES};
use crate::models::Recipe;

pub const GREETING_REPLY: &str =
    "Hello! Tell me which ingredients you have and I will suggest a recipe.";

const GREETING_WORDS: &[&str] = &[
    "hi", "hello", "hey", "hiya", "thanks", "thank", "you", "good", "morning", "evening",
];

const LIST_PHRASES: &[&str] = &[
    "list",
    "all recipes",
    "what recipes",
    "which recipes",
    "show recipes",
    "show me recipes",
    "available recipes",
];

const HOW_TO_PHRASES: &[&str] = &[
    "how do i make",
    "how do you make",
    "how to make",
    "how to cook",
    "how do i cook",
    "steps for",
    "recipe for",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    ListRecipes,
    HowToMake(String),
    Suggest,
}

fn normalize(query: &str) -> String {
    query
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[must_use]
pub fn classify(query: &str) -> Intent {
    let text = normalize(query);
    if text.is_empty() {
        return Intent::Suggest;
    }

    if text.split(' ').all(|w| GREETING_WORDS.contains(&w)) {
        return Intent::Greeting;
    }

    for phrase in HOW_TO_PHRASES {
        if let Some(idx) = text.find(phrase) {
            let rest = text[idx + phrase.len()..].trim();
            let rest = ["a ", "an ", "the ", "some "]
                .iter()
                .find_map(|article| rest.strip_prefix(article))
                .unwrap_or(rest)
                .trim();
            if !rest.is_empty() {
                return Intent::HowToMake(rest.to_string());
            }
        }
    }

    let padded = format!(" {text} ");
    if LIST_PHRASES
        .iter()
        .any(|phrase| padded.contains(&format!(" {phrase} ")))
    {
        return Intent::ListRecipes;
    }

    Intent::Suggest
}

fn has_words(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && format!(" {haystack} ").contains(&format!(" {needle} "))
}

/// Exact (case-insensitive) name first, then the shortest name containing
/// the text, then a name contained in the text. Containment only counts
/// whole words.
#[must_use]
pub fn find_by_name<'a>(name: &str, recipes: &'a [Recipe]) -> Option<&'a Recipe> {
    let name = normalize(name);
    if name.is_empty() {
        return None;
    }
    let names: Vec<String> = recipes.iter().map(|r| normalize(&r.name)).collect();

    if let Some(idx) = names.iter().position(|n| *n == name) {
        return Some(&recipes[idx]);
    }
    if let Some((idx, _)) = names
        .iter()
        .enumerate()
        .filter(|(_, n)| has_words(n.as_str(), &name))
        .min_by_key(|(_, n)| n.len())
    {
        return Some(&recipes[idx]);
    }
    names
        .iter()
        .position(|n| has_words(&name, n.as_str()))
        .map(|idx| &recipes[idx])
}

#[must_use]
pub fn render_steps(recipe: &Recipe) -> String {
    let mut out = format!("Here is how to make {}:\n\nIngredients:", recipe.name);
    for line in recipe.ingredient_lines() {
        out.push_str("\n- ");
        out.push_str(line);
    }
    out.push_str("\n\nSteps:\n");
    out.push_str(recipe.steps.trim());
    out
}

fn render_list(recipes: &[Recipe]) -> String {
    if recipes.is_empty() {
        return NO_RECIPES.to_string();
    }
    let mut out = format!("I know {} recipe(s):", recipes.len());
    for recipe in recipes {
        out.push_str("\n- ");
        out.push_str(&recipe.name);
    }
    out
}

#[must_use]
pub fn reply(query: &str, recipes: &[Recipe], options: &MatchOptions) -> String {
    match classify(query) {
        Intent::Greeting => GREETING_REPLY.to_string(),
        Intent::ListRecipes => render_list(recipes),
        Intent::HowToMake(name) => match find_by_name(&name, recipes) {
            Some(recipe) => render_steps(recipe),
            None => matcher::suggest(query, recipes, options).to_string(),
        },
        Intent::Suggest => matcher::suggest(query, recipes, options).to_string(),
    }
}
