use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::matcher::{ScoredRecipe, ingredient_snippet};
use larder_core::models::{Recipe, User};

/// Read one line from stdin after printing `label` to stderr.
pub(crate) fn prompt_line(label: &str) -> Result<String> {
    eprint!("{label}");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Ask for a new password twice and require both entries to match.
pub(crate) fn prompt_new_password(username: &str) -> Result<String> {
    let first = prompt_line(&format!("New password for {username}: "))?;
    let second = prompt_line("Repeat password: ")?;
    if first != second {
        bail!("Passwords do not match");
    }
    Ok(first)
}

pub(crate) fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Ingredients")]
        ingredients: String,
        #[tabled(rename = "Owner")]
        owner: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .enumerate()
        .map(|(i, r)| RecipeRow {
            idx: i + 1,
            name: truncate(&r.name, 30),
            ingredients: truncate(&ingredient_snippet(r, 4), 40),
            owner: if r.owner.is_empty() {
                "-".to_string()
            } else {
                truncate(&r.owner, 16)
            },
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_match_table(matches: &[ScoredRecipe]) {
    #[derive(Tabled)]
    struct MatchRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Recipe")]
        name: String,
        #[tabled(rename = "Score")]
        score: u32,
        #[tabled(rename = "Ingredients")]
        ingredients: String,
    }

    let rows: Vec<MatchRow> = matches
        .iter()
        .enumerate()
        .map(|(i, m)| MatchRow {
            idx: i + 1,
            name: truncate(&m.recipe.name, 30),
            score: m.score,
            ingredients: truncate(&ingredient_snippet(&m.recipe, 4), 40),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_user_table(users: &[User]) {
    #[derive(Tabled)]
    struct UserRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Username")]
        username: String,
        #[tabled(rename = "Role")]
        role: String,
        #[tabled(rename = "Created")]
        created_at: String,
    }

    let rows: Vec<UserRow> = users
        .iter()
        .map(|u| UserRow {
            id: u.id,
            username: u.username.clone(),
            role: u.role.to_string(),
            created_at: u.created_at.chars().take(10).collect(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(0..1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
