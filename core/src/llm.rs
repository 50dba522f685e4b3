//! Prompt and response types for the hosted text-generation assistant.
//!
//! The HTTP call itself lives in the CLI crate; this module only knows how
//! to describe the recipe collection to the model and how to read its reply.

use serde::{Deserialize, Serialize};

use crate::models::Recipe;

pub const DEFAULT_MODEL: &str = "google/flan-t5-large";
pub const INFERENCE_URL: &str = "https://api-inference.huggingface.co/models";

pub const NO_API_KEY: &str = "Hugging Face API key not configured.";
pub const BUSY: &str = "AI is busy. Try again later.";
pub const NO_RESPONSE: &str = "No response from AI.";

#[derive(Debug, Serialize)]
pub struct GenerationRequest<'a> {
    pub inputs: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct Generation {
    pub generated_text: Option<String>,
}

/// Every recipe as a name / ingredients / steps block, blocks separated by `---`.
#[must_use]
pub fn recipe_context(recipes: &[Recipe]) -> String {
    let mut text = String::new();
    for r in recipes {
        text.push_str(&format!(
            "Recipe Name: {}\nIngredients: {}\nSteps: {}\n---\n",
            r.name, r.ingredients, r.steps
        ));
    }
    text
}

#[must_use]
pub fn build_prompt(query: &str, recipes: &[Recipe]) -> String {
    let context = recipe_context(recipes);
    format!(
        "You are a friendly, helpful cooking assistant.

Answer in a clear and human way:
- Explain step by step
- Use simple language
- Be polite and supportive
- Format neatly using bullet points or numbering

IMPORTANT RULES:
- Use ONLY the recipes given below
- Do NOT invent new recipes
- Do NOT add ingredients not listed

User question:
{query}

Available recipes:
{context}
Give the answer as if you are teaching a beginner.
"
    )
}

/// Read a hosted inference reply. A JSON array is a generation (its first
/// element's `generated_text`, or [`NO_RESPONSE`]); anything else, such as an
/// `{"error": ...}` object while the model loads, yields `None`.
#[must_use]
pub fn parse_generation(value: &serde_json::Value) -> Option<String> {
    let items: Vec<Generation> = serde_json::from_value(value.clone()).ok()?;
    Some(
        items
            .into_iter()
            .next()
            .and_then(|g| g.generated_text)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| NO_RESPONSE.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewRecipe;
    use serde_json::json;

    fn soup() -> Recipe {
        NewRecipe {
            name: "Tomato Soup".to_string(),
            ingredients: "tomato\nonion".to_string(),
            steps: "Simmer.".to_string(),
            ..NewRecipe::default()
        }
        .into_recipe("2024-01-01T00:00:00+00:00")
    }

    #[test]
    fn test_recipe_context() {
        let context = recipe_context(&[soup()]);
        assert_eq!(
            context,
            "Recipe Name: Tomato Soup\nIngredients: tomato\nonion\nSteps: Simmer.\n---\n"
        );
    }

    #[test]
    fn test_build_prompt_includes_question_and_recipes() {
        let prompt = build_prompt("What can I cook with onion?", &[soup()]);
        assert!(prompt.contains("User question:\nWhat can I cook with onion?"));
        assert!(prompt.contains("Recipe Name: Tomato Soup"));
        assert!(prompt.contains("Use ONLY the recipes given below"));
    }

    #[test]
    fn test_parse_generation() {
        let ok = json!([{ "generated_text": "Make the soup." }]);
        assert_eq!(parse_generation(&ok).as_deref(), Some("Make the soup."));

        let empty = json!([{}]);
        assert_eq!(parse_generation(&empty).as_deref(), Some(NO_RESPONSE));
        assert_eq!(parse_generation(&json!([])).as_deref(), Some(NO_RESPONSE));

        let loading = json!({ "error": "Model is currently loading" });
        assert!(parse_generation(&loading).is_none());
    }
}
