//! Ingredient matcher.
//!
//! Ranks recipes against a free-text query by counting overlaps between the
//! query's ingredient words and each recipe's ingredient words. Two words
//! overlap when one contains the other or their normalized Levenshtein
//! similarity is above the configured threshold.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use strsim::normalized_levenshtein;
use tracing::debug;

use crate::models::Recipe;

pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_THRESHOLD: f64 = 0.7;
/// Minimum similarity for replacing an unknown query word with a known ingredient.
pub const SPELLING_THRESHOLD: f64 = 0.8;

pub const NO_RECIPES: &str = "No recipes available.";
pub const NO_INGREDIENTS: &str = "Please specify some ingredients.";
pub const NO_MATCHES: &str = "No related recipes found.";

pub const STOP_WORDS: &[&str] = &[
    "i", "im", "have", "has", "and", "a", "an", "the", "with", "what", "can", "make", "cook",
    "me", "some", "want", "to", "do", "you", "is", "are", "of", "for", "in", "my", "please",
    "recipe", "recipes", "suggest", "something", "using", "got", "any", "or", "how", "it",
    "that", "this", "there", "give", "show", "find", "need", "use", "only", "just", "like",
    "would", "could", "should", "at", "home", "left", "leftover", "from", "on", "be", "we",
];

/// Quantities and preparation words that say nothing about the ingredient.
const MEASURE_WORDS: &[&str] = &[
    "cup", "cups", "tsp", "tbsp", "teaspoon", "teaspoons", "tablespoon", "tablespoons", "gram",
    "grams", "litre", "liter", "pinch", "piece", "pieces", "large", "small", "medium", "chopped",
    "sliced", "diced", "minced", "fresh", "taste", "optional",
];

/// Words shorter than this (units such as "g" or "ml" left over from
/// "200g") are dropped before matching.
const MIN_TOKEN_LEN: usize = 3;

/// Maps a variant spelling, plural, or regional name to one canonical word.
/// Applied to both query and ingredient words so equivalent names meet.
const SYNONYMS: &[(&str, &str)] = &[
    ("tomatoes", "tomato"),
    ("potatoes", "potato"),
    ("onions", "onion"),
    ("eggs", "egg"),
    ("carrots", "carrot"),
    ("chillies", "chili"),
    ("chilies", "chili"),
    ("chilli", "chili"),
    ("chile", "chili"),
    ("capsicum", "pepper"),
    ("peppers", "pepper"),
    ("cilantro", "coriander"),
    ("aubergine", "eggplant"),
    ("brinjal", "eggplant"),
    ("courgette", "zucchini"),
    ("prawns", "shrimp"),
    ("prawn", "shrimp"),
    ("shrimps", "shrimp"),
    ("curd", "yogurt"),
    ("yoghurt", "yogurt"),
    ("maida", "flour"),
    ("atta", "flour"),
    ("scallion", "spring onion"),
    ("scallions", "spring onion"),
    ("garbanzo", "chickpea"),
    ("chickpeas", "chickpea"),
    ("chana", "chickpea"),
    ("paneer", "cheese"),
    ("noodles", "noodle"),
    ("mushrooms", "mushroom"),
    ("beans", "bean"),
    ("lentils", "lentil"),
    ("dal", "lentil"),
    ("dhal", "lentil"),
    ("apples", "apple"),
    ("bananas", "banana"),
    ("lemons", "lemon"),
    ("cloves", "clove"),
    ("herbs", "herb"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Maximum number of recipes returned.
    pub limit: usize,
    /// Similarity above which two words count as a match.
    pub threshold: f64,
    pub synonyms: bool,
    pub spelling: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            threshold: DEFAULT_THRESHOLD,
            synonyms: true,
            spelling: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecipe {
    pub score: u32,
    pub recipe: Recipe,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Suggestion {
    NoRecipes,
    NoIngredients,
    NoMatches,
    Matches(Vec<ScoredRecipe>),
}

impl Suggestion {
    /// The fixed reply for empty outcomes, `None` when there are matches.
    #[must_use]
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Self::NoRecipes => Some(NO_RECIPES),
            Self::NoIngredients => Some(NO_INGREDIENTS),
            Self::NoMatches => Some(NO_MATCHES),
            Self::Matches(_) => None,
        }
    }

    #[must_use]
    pub fn matches(&self) -> &[ScoredRecipe] {
        match self {
            Self::Matches(m) => m,
            _ => &[],
        }
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(message) = self.message() {
            return f.write_str(message);
        }
        writeln!(f, "Here are recipes you can make:")?;
        for (i, m) in self.matches().iter().enumerate() {
            let name = &m.recipe.name;
            let score = m.score;
            let snippet = ingredient_snippet(&m.recipe, 5);
            write!(f, "\n{}. {name} (matches: {score}) - {snippet}", i + 1)?;
        }
        Ok(())
    }
}

/// First `n` ingredient entries joined with commas, with an ellipsis if cut.
#[must_use]
pub fn ingredient_snippet(recipe: &Recipe, n: usize) -> String {
    let lines = recipe.ingredient_lines();
    let mut snippet = lines.iter().take(n).copied().collect::<Vec<_>>().join(", ");
    if lines.len() > n {
        snippet.push_str(", ...");
    }
    snippet
}

fn is_stop_word(word: &str) -> bool {
    word.chars().count() < MIN_TOKEN_LEN || STOP_WORDS.contains(&word) || MEASURE_WORDS.contains(&word)
}

/// Lower-case, keep letters only, split on whitespace.
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// Query words with stop words removed, deduplicated, in order of appearance.
#[must_use]
pub fn tokenize(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    words(query)
        .into_iter()
        .filter(|w| !is_stop_word(w))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

#[must_use]
pub fn canonical(word: &str) -> &str {
    SYNONYMS
        .iter()
        .find(|(variant, _)| *variant == word)
        .map_or(word, |&(_, canonical)| canonical)
}

/// Replace every word by its canonical form, dropping duplicates that result.
#[must_use]
pub fn expand_synonyms(tokens: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .flat_map(|t| canonical(t).split_whitespace().map(String::from).collect::<Vec<_>>())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Ingredient words of one recipe, split by line or comma first.
#[must_use]
pub fn ingredient_tokens(recipe: &Recipe, synonyms: bool) -> Vec<String> {
    recipe
        .ingredient_lines()
        .into_iter()
        .flat_map(words)
        .filter(|w| !is_stop_word(w))
        .flat_map(|w| {
            let word = if synonyms { canonical(&w).to_string() } else { w };
            word.split_whitespace().map(String::from).collect::<Vec<_>>()
        })
        .collect()
}

#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

fn tokens_match(a: &str, b: &str, threshold: f64) -> bool {
    a.contains(b) || b.contains(a) || similarity(a, b) > threshold
}

/// Swap each query word missing from `vocabulary` for its closest known
/// ingredient word, if one is similar enough.
#[must_use]
pub fn correct_spelling(tokens: &[String], vocabulary: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .map(|token| {
            if vocabulary.contains(token) {
                return token.clone();
            }
            vocabulary
                .iter()
                .map(|word| (similarity(token, word), word))
                .filter(|(score, _)| *score >= SPELLING_THRESHOLD)
                .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(a.1)))
                .map_or_else(|| token.clone(), |(_, word)| word.clone())
        })
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// One point per (query word, ingredient word) pair that matches.
#[must_use]
pub fn score_tokens(query: &[String], ingredients: &[String], threshold: f64) -> u32 {
    let mut score = 0;
    for q in query {
        for i in ingredients {
            if tokens_match(q, i, threshold) {
                score += 1;
            }
        }
    }
    score
}

/// Score every recipe, drop zero scores, and return the best `limit` by
/// descending score. Equal scores keep store order.
#[must_use]
pub fn rank(query: &str, recipes: &[Recipe], options: &MatchOptions) -> Vec<ScoredRecipe> {
    let mut tokens = tokenize(query);
    if options.synonyms {
        tokens = expand_synonyms(&tokens);
    }

    let per_recipe: Vec<Vec<String>> = recipes
        .iter()
        .map(|r| ingredient_tokens(r, options.synonyms))
        .collect();

    if options.spelling {
        let vocabulary: HashSet<String> = per_recipe.iter().flatten().cloned().collect();
        tokens = correct_spelling(&tokens, &vocabulary);
    }
    debug!(?tokens, "matching query");

    let mut scored: Vec<ScoredRecipe> = recipes
        .iter()
        .zip(&per_recipe)
        .filter_map(|(recipe, ingredients)| {
            let score = score_tokens(&tokens, ingredients, options.threshold);
            (score > 0).then(|| ScoredRecipe {
                score,
                recipe: recipe.clone(),
            })
        })
        .collect();

    // `sort_by` is stable, so ties stay in store order.
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(options.limit);
    scored
}

#[must_use]
pub fn suggest(query: &str, recipes: &[Recipe], options: &MatchOptions) -> Suggestion {
    if recipes.is_empty() {
        return Suggestion::NoRecipes;
    }
    if tokenize(query).is_empty() {
        return Suggestion::NoIngredients;
    }
    let matches = rank(query, recipes, options);
    if matches.is_empty() {
        Suggestion::NoMatches
    } else {
        Suggestion::Matches(matches)
    }
}
