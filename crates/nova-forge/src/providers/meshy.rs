//! Meshy 3D model generation provider
//!
//! Seeded generations go through the image-to-3d API with the concept image;
//! without a concept the text-to-3d API is used with the prompt alone.
//! Both are long-running (~2-5 min) and polled on the background task.

use super::http::{HttpClient, PollSchedule, PollStep};
use crate::config::{ForgeConfig, MESHY};
use crate::provider::{GeneratedMesh, MeshGenerator, ProviderStatus};
use nova_core::{NovaError, Result};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_TEXT_TO_3D_URL: &str = "https://api.meshy.ai/openapi/v2/text-to-3d";
const DEFAULT_IMAGE_TO_3D_URL: &str = "https://api.meshy.ai/openapi/v1/image-to-3d";
const POLL_SCHEDULE: PollSchedule =
    PollSchedule::new(Duration::from_secs(5), Duration::from_secs(15), 60);

/// Meshy provider for AI 3D model generation
pub struct MeshyMeshGenerator {
    client: HttpClient,
    text_url: String,
    image_url: String,
    schedule: PollSchedule,
}

impl MeshyMeshGenerator {
    /// Create a new generator from config
    pub fn from_config(config: &ForgeConfig) -> Result<Self> {
        let api_key = config.api_key(MESHY).ok_or_else(|| {
            NovaError::Config(
                "Meshy API key not configured. Set NOVAFORGE_MESHY_API_KEY or add to .novaforge/config.toml"
                    .to_string(),
            )
        })?;

        Ok(Self {
            client: HttpClient::new(
                MESHY,
                Some(format!("Bearer {}", api_key)),
                config.timeout(MESHY),
            ),
            text_url: config
                .api_url(MESHY)
                .unwrap_or(DEFAULT_TEXT_TO_3D_URL)
                .to_string(),
            image_url: config
                .image_api_url(MESHY)
                .unwrap_or(DEFAULT_IMAGE_TO_3D_URL)
                .to_string(),
            schedule: POLL_SCHEDULE,
        })
    }

    /// Submit a task and return (task endpoint, task id)
    fn submit_task(&self, prompt: &str, concept_image: Option<&str>) -> Result<(String, String)> {
        let (endpoint, payload) = match concept_image {
            Some(image) => (
                &self.image_url,
                serde_json::json!({
                    "image_url": image,
                    "enable_pbr": true,
                    "should_remesh": true,
                    "should_texture": true
                }),
            ),
            None => (
                &self.text_url,
                serde_json::json!({
                    "mode": "preview",
                    "prompt": prompt,
                    "art_style": "realistic",
                    "should_remesh": true
                }),
            ),
        };

        let response = self.client.post_json(endpoint, &payload)?;
        let task_id = parse_submit_value(&response)?;
        Ok((endpoint.clone(), task_id))
    }

    fn poll_task(&self, endpoint: &str, task_id: &str) -> Result<MeshyTaskStatus> {
        let response = self.client.get_json(&format!("{}/{}", endpoint, task_id))?;
        Ok(task_status(&response))
    }
}

#[derive(Debug, PartialEq)]
enum MeshyTaskStatus {
    Processing(u8),
    Complete { model_url: Option<String> },
    Failed(String),
}

impl MeshGenerator for MeshyMeshGenerator {
    fn name(&self) -> &str {
        MESHY
    }

    fn health_check(&self) -> ProviderStatus {
        // from_config refuses to build without a key
        ProviderStatus::Available
    }

    fn generate_mesh(&self, prompt: &str, concept_image: Option<&str>) -> Result<GeneratedMesh> {
        let (endpoint, task_id) = self.submit_task(prompt, concept_image)?;
        info!(task_id = %task_id, seeded = concept_image.is_some(), "submitted Meshy task");

        let model_url = self.schedule.run("meshy generation", |_| {
            match self.poll_task(&endpoint, &task_id)? {
                MeshyTaskStatus::Processing(progress) => Ok(PollStep::Pending(Some(progress))),
                MeshyTaskStatus::Complete { model_url } => {
                    let url = model_url.ok_or_else(|| {
                        NovaError::Upstream("No GLB URL in completion response".to_string())
                    })?;
                    Ok(PollStep::Done(url))
                }
                MeshyTaskStatus::Failed(msg) => Err(NovaError::Upstream(format!(
                    "Meshy generation failed: {}",
                    msg
                ))),
            }
        })?;

        let glb = self.client.download_bytes(&model_url)?;
        debug!(task_id = %task_id, bytes = glb.len(), "downloaded Meshy model");

        Ok(GeneratedMesh {
            task_id: Some(task_id),
            model_url,
            glb,
        })
    }
}

fn parse_submit_value(response: &serde_json::Value) -> Result<String> {
    response
        .get("result")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            NovaError::Upstream(format!(
                "Unexpected Meshy submit response: {}",
                serde_json::to_string(response).unwrap_or_default()
            ))
        })
}

fn task_status(response: &serde_json::Value) -> MeshyTaskStatus {
    let status = response
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or("UNKNOWN");

    let progress = response
        .get("progress")
        .and_then(|p| p.as_u64())
        .unwrap_or(0)
        .min(100) as u8;

    match status {
        "SUCCEEDED" => MeshyTaskStatus::Complete {
            model_url: response
                .get("model_urls")
                .and_then(|u| u.get("glb"))
                .and_then(|u| u.as_str())
                .map(str::to_string),
        },
        "FAILED" | "EXPIRED" | "CANCELED" => MeshyTaskStatus::Failed(
            response
                .get("task_error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error")
                .to_string(),
        ),
        _ => MeshyTaskStatus::Processing(progress),
    }
}
