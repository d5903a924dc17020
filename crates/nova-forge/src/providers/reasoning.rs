//! Reasoning-service classifier
//!
//! Sends the lore preamble and the user prompt (plus an optional reference
//! image) to an OpenAI-compatible chat completions endpoint and asks for a
//! JSON generation spec back. One attempt per request: the call is bounded
//! by the classifier timeout so it always fits the response budget.

use super::http::HttpClient;
use crate::config::{ForgeConfig, REASONING};
use crate::provider::{Classifier, ProviderStatus};
use crate::spec::GenerationSpec;
use nova_core::{NovaError, Result};
use std::time::Duration;

const DEFAULT_REASONING_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_REASONING_MODEL: &str = "gpt-4o-mini";

const INSTRUCTIONS: &str = "Classify the user's asset request and rewrite it as a concise, \
visually specific generation prompt. Answer with a single JSON object and nothing else: \
{\"refined_prompt\": string, \"dimensions\": {\"height\": number, \"width\": number, \
\"depth\": number}, \"category\": \"Character\" | \"Prop\" | \"Terrain\", \
\"complexity\": \"Low\" | \"High\"}. Dimensions are in meters and must be positive.";

/// Classifier backed by a chat-completions reasoning model
pub struct ReasoningClassifier {
    api_key: Option<String>,
    api_url: String,
    model: String,
    lore: String,
    timeout: Duration,
}

impl ReasoningClassifier {
    /// Create a classifier from config. A missing API key is not an error:
    /// every call then fails fast and the pipeline uses the fallback spec.
    pub fn from_config(config: &ForgeConfig) -> Self {
        Self {
            api_key: config.api_key(REASONING).map(str::to_string),
            api_url: config
                .api_url(REASONING)
                .unwrap_or(DEFAULT_REASONING_URL)
                .to_string(),
            model: config
                .model(REASONING)
                .unwrap_or(DEFAULT_REASONING_MODEL)
                .to_string(),
            lore: config.lore().to_string(),
            timeout: config.classifier_timeout(),
        }
    }

    fn build_payload(&self, prompt: &str, image_url: Option<&str>) -> serde_json::Value {
        let mut content = vec![serde_json::json!({ "type": "text", "text": prompt })];
        if let Some(url) = image_url {
            content.push(serde_json::json!({
                "type": "image_url",
                "image_url": { "url": url }
            }));
        }

        serde_json::json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": format!("{}\n\n{}", self.lore, INSTRUCTIONS) },
                { "role": "user", "content": content }
            ]
        })
    }
}

impl Classifier for ReasoningClassifier {
    fn name(&self) -> &str {
        REASONING
    }

    fn health_check(&self) -> ProviderStatus {
        if self.api_key.is_none() {
            return ProviderStatus::NoApiKey;
        }
        ProviderStatus::Available
    }

    fn refine(&self, prompt: &str, image_url: Option<&str>) -> Result<GenerationSpec> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            NovaError::Upstream(
                "Reasoning API key not configured. Set NOVAFORGE_REASONING_API_KEY".to_string(),
            )
        })?;

        let client = HttpClient::new(REASONING, Some(format!("Bearer {}", api_key)), self.timeout)
            .without_retries();
        let response = client.post_json(&self.api_url, &self.build_payload(prompt, image_url))?;

        let content = extract_message_content(&response)?;
        GenerationSpec::parse_response(content)
    }
}

fn extract_message_content(response: &serde_json::Value) -> Result<&str> {
    response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            NovaError::Upstream(format!(
                "Unexpected reasoning response: {}",
                serde_json::to_string(response).unwrap_or_default()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Category;

    fn spec_from(json: &str) -> Result<GenerationSpec> {
        let response: serde_json::Value = serde_json::from_str(json).unwrap();
        GenerationSpec::parse_response(extract_message_content(&response)?)
    }

    #[test]
    fn test_spec_from_chat_completion() {
        let json = r#"{
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "{\"refined_prompt\": \"weathered sandstone mesa\", \"dimensions\": {\"height\": 40, \"width\": 200, \"depth\": 200}, \"category\": \"Terrain\", \"complexity\": \"Low\"}"
                }
            }]
        }"#;
        let spec = spec_from(json).unwrap();
        assert_eq!(spec.category, Category::Terrain);
        assert_eq!(spec.refined_prompt, "weathered sandstone mesa");
    }

    #[test]
    fn test_completion_without_choices_is_rejected() {
        assert!(spec_from(r#"{"error": {"message": "quota"}}"#).is_err());
    }

    #[test]
    fn test_missing_key_fails_fast() {
        let classifier = ReasoningClassifier::from_config(&ForgeConfig::default());
        assert_eq!(classifier.health_check(), ProviderStatus::NoApiKey);
        let err = classifier.refine("glowing blue cube", None).unwrap_err();
        assert!(matches!(err, NovaError::Upstream(_)));
    }

    #[test]
    fn test_payload_carries_lore_and_image() {
        let classifier = ReasoningClassifier::from_config(&ForgeConfig::default());
        let payload = classifier.build_payload("stone golem", Some("https://img.example.com/ref.png"));
        let system = payload["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("NovaForge"));
        assert!(system.contains("refined_prompt"));
        let user = payload["messages"][1]["content"].as_array().unwrap();
        assert_eq!(user.len(), 2);
        assert_eq!(user[1]["image_url"]["url"], "https://img.example.com/ref.png");
    }
}
