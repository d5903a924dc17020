//! Flux concept image provider (fal.ai)
//!
//! Submits to the fal.ai queue endpoint. Fast models may answer inline with
//! the images; otherwise the request is polled through its `status_url`
//! until completed, then the result is read from `response_url`.

use super::http::{HttpClient, PollSchedule, PollStep};
use crate::config::{ForgeConfig, FLUX};
use crate::provider::{ConceptGenerator, ProviderStatus};
use nova_core::{NovaError, Result};
use std::time::Duration;

const DEFAULT_FLUX_URL: &str = "https://queue.fal.run/fal-ai/flux/dev";
const POLL_SCHEDULE: PollSchedule =
    PollSchedule::new(Duration::from_secs(1), Duration::from_secs(8), 30);

/// Flux provider for concept art via fal.ai
pub struct FluxConceptGenerator {
    api_key: Option<String>,
    api_url: String,
    timeout: Duration,
    schedule: PollSchedule,
}

impl FluxConceptGenerator {
    /// Create a new generator from config. Without a key every call fails
    /// and the CloudMesh path continues prompt-only.
    pub fn from_config(config: &ForgeConfig) -> Self {
        Self {
            api_key: config.api_key(FLUX).map(str::to_string),
            api_url: config.api_url(FLUX).unwrap_or(DEFAULT_FLUX_URL).to_string(),
            timeout: config.timeout(FLUX),
            schedule: POLL_SCHEDULE,
        }
    }

    fn client(&self) -> Result<HttpClient> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            NovaError::Upstream(
                "Flux API key not configured. Set NOVAFORGE_FLUX_API_KEY".to_string(),
            )
        })?;
        Ok(HttpClient::new(
            FLUX,
            Some(format!("Key {}", api_key)),
            self.timeout,
        ))
    }
}

impl ConceptGenerator for FluxConceptGenerator {
    fn name(&self) -> &str {
        FLUX
    }

    fn health_check(&self) -> ProviderStatus {
        if self.api_key.is_none() {
            return ProviderStatus::NoApiKey;
        }
        ProviderStatus::Available
    }

    fn generate_concept(&self, prompt: &str) -> Result<String> {
        let client = self.client()?;
        let payload = serde_json::json!({
            "prompt": format!("Concept art, neutral background, full view: {}", prompt),
            "image_size": "square_hd",
            "num_images": 1,
            "enable_safety_checker": true
        });

        let submitted = client.post_json(&self.api_url, &payload)?;
        if let Some(url) = first_image_url(&submitted) {
            return Ok(url);
        }

        let handle = QueueHandle::from_response(&submitted)?;
        self.schedule.run("flux concept", |_| {
            let status = client.get_json(&handle.status_url)?;
            match status.get("status").and_then(|s| s.as_str()) {
                Some("COMPLETED") => Ok(PollStep::Done(())),
                Some("IN_QUEUE") | Some("IN_PROGRESS") => Ok(PollStep::Pending(None)),
                other => Err(NovaError::Upstream(format!(
                    "Flux request {} ended with status {:?}",
                    handle.request_id, other
                ))),
            }
        })?;

        let result = client.get_json(&handle.response_url)?;
        first_image_url(&result).ok_or_else(|| {
            NovaError::Upstream(format!(
                "Unexpected Flux result format: {}",
                serde_json::to_string(&result).unwrap_or_default()
            ))
        })
    }
}

/// Queue handle returned by fal.ai when a request is accepted
#[derive(Debug, Clone, PartialEq)]
struct QueueHandle {
    request_id: String,
    status_url: String,
    response_url: String,
}

impl QueueHandle {
    fn from_response(response: &serde_json::Value) -> Result<Self> {
        let field = |name: &str| {
            response
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        match (field("request_id"), field("status_url"), field("response_url")) {
            (Some(request_id), Some(status_url), Some(response_url)) => Ok(Self {
                request_id,
                status_url,
                response_url,
            }),
            _ => Err(NovaError::Upstream(format!(
                "Unexpected Flux submit response: {}",
                serde_json::to_string(response).unwrap_or_default()
            ))),
        }
    }
}

fn first_image_url(response: &serde_json::Value) -> Option<String> {
    response
        .get("images")
        .and_then(|imgs| imgs.as_array())
        .and_then(|arr| arr.first())
        .and_then(|img| img.get("url"))
        .and_then(|u| u.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_of(json: &str) -> Option<String> {
        first_image_url(&serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_image_url_from_result() {
        let json = r#"{
            "images": [
                {
                    "url": "https://fal.media/files/concept.png",
                    "width": 1024,
                    "height": 1024,
                    "content_type": "image/png"
                }
            ],
            "seed": 42,
            "prompt": "cyberpunk mercenary"
        }"#;
        assert_eq!(
            image_of(json).as_deref(),
            Some("https://fal.media/files/concept.png")
        );
    }

    #[test]
    fn test_no_image_url_in_error_body() {
        assert_eq!(image_of(r#"{"detail": "Unauthorized"}"#), None);
    }

    #[test]
    fn test_queue_handle_from_submit() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{
                "request_id": "764cabcf-b745-4b3e-ae38-1200304cf45b",
                "status_url": "https://queue.fal.run/fal-ai/flux/requests/764c/status",
                "response_url": "https://queue.fal.run/fal-ai/flux/requests/764c"
            }"#,
        )
        .unwrap();
        let handle = QueueHandle::from_response(&json).unwrap();
        assert_eq!(handle.request_id, "764cabcf-b745-4b3e-ae38-1200304cf45b");
        assert!(handle.status_url.ends_with("/status"));

        let missing: serde_json::Value = serde_json::json!({ "request_id": "x" });
        assert!(QueueHandle::from_response(&missing).is_err());
    }

    #[test]
    fn test_missing_key_reports_no_api_key() {
        let generator = FluxConceptGenerator::from_config(&ForgeConfig::default());
        assert_eq!(generator.health_check(), ProviderStatus::NoApiKey);
        assert!(generator.generate_concept("crate").is_err());
    }
}
