use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, warn};

use larder_core::llm::{
    BUSY, GenerationRequest, INFERENCE_URL, NO_API_KEY, build_prompt, parse_generation,
};
use larder_core::matcher::NO_RECIPES;
use larder_core::models::Recipe;

/// Client for the hosted text-generation endpoint used by `ask`.
#[derive(Clone)]
pub struct HostedModelClient {
    client: reqwest::Client,
    api_key: Option<String>,
    url: String,
}

impl HostedModelClient {
    pub fn new(api_key: Option<String>, model: &str) -> Result<Self> {
        Self::with_base_url(api_key, INFERENCE_URL, model)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "larder/{} (recipe assistant)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            url: format!("{}/{model}", base_url.trim_end_matches('/')),
        })
    }

    /// Ask the model about `recipes`. Always yields text: failures collapse to
    /// a fixed message after being logged.
    pub async fn ask(&self, query: &str, recipes: &[Recipe]) -> String {
        let Some(key) = self.api_key.as_deref() else {
            return NO_API_KEY.to_string();
        };
        if recipes.is_empty() {
            return NO_RECIPES.to_string();
        }

        let prompt = build_prompt(query, recipes);
        match self.generate(key, &prompt).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                warn!(url = %self.url, "hosted model returned no generation");
                BUSY.to_string()
            }
            Err(e) => {
                warn!(url = %self.url, error = %format!("{e:#}"), "hosted model call failed");
                BUSY.to_string()
            }
        }
    }

    async fn generate(&self, key: &str, prompt: &str) -> Result<Option<String>> {
        debug!(url = %self.url, prompt_len = prompt.len(), "calling hosted model");
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .json(&GenerationRequest { inputs: prompt })
            .send()
            .await
            .context("Failed to reach inference API")?
            .error_for_status()
            .context("Inference API returned an error status")?;

        let value: serde_json::Value = resp
            .json()
            .await
            .context("Failed to parse inference response")?;
        Ok(parse_generation(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
    use larder_core::llm::NO_RESPONSE;
    use larder_core::models::NewRecipe;
    use serde_json::{Value, json};

    fn soup() -> Recipe {
        NewRecipe {
            name: "Tomato Soup".to_string(),
            ingredients: "tomato\nonion".to_string(),
            steps: "Simmer.".to_string(),
            ..NewRecipe::default()
        }
        .into_recipe("2024-01-01T00:00:00+00:00")
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/models")
    }

    #[tokio::test]
    async fn test_missing_key() {
        let client = HostedModelClient::new(None, "m").unwrap();
        assert_eq!(client.ask("hi", &[soup()]).await, NO_API_KEY);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let client = HostedModelClient::new(Some("k".into()), "m").unwrap();
        assert_eq!(client.ask("hi", &[]).await, NO_RECIPES);
    }

    #[tokio::test]
    async fn test_generation_returned() {
        async fn handler(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
            if auth != Some("Bearer secret") {
                return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
            }
            let inputs = body["inputs"].as_str().unwrap_or_default();
            let text = if inputs.contains("Recipe Name: Tomato Soup") {
                "Simmer the tomatoes."
            } else {
                "missing context"
            };
            (StatusCode::OK, Json(json!([{ "generated_text": text }])))
        }

        let base = spawn(Router::new().route("/models/{*model}", post(handler))).await;
        let client = HostedModelClient::with_base_url(Some("secret".into()), &base, "org/model").unwrap();
        assert_eq!(client.ask("soup?", &[soup()]).await, "Simmer the tomatoes.");

        let wrong_key = HostedModelClient::with_base_url(Some("nope".into()), &base, "org/model").unwrap();
        assert_eq!(wrong_key.ask("soup?", &[soup()]).await, BUSY);
    }

    #[tokio::test]
    async fn test_loading_and_empty_replies() {
        let loading = spawn(Router::new().route(
            "/models/{*model}",
            post(|| async { Json(json!({ "error": "Model is currently loading" })) }),
        ))
        .await;
        let client = HostedModelClient::with_base_url(Some("k".into()), &loading, "m").unwrap();
        assert_eq!(client.ask("soup?", &[soup()]).await, BUSY);

        let empty = spawn(Router::new().route(
            "/models/{*model}",
            post(|| async { Json(json!([])) }),
        ))
        .await;
        let client = HostedModelClient::with_base_url(Some("k".into()), &empty, "m").unwrap();
        assert_eq!(client.ask("soup?", &[soup()]).await, NO_RESPONSE);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client =
            HostedModelClient::with_base_url(Some("k".into()), &format!("http://{addr}"), "m").unwrap();
        assert_eq!(client.ask("soup?", &[soup()]).await, BUSY);
    }
}
