//! Request and response types of the dispatch and poll interfaces

use crate::job::{Job, JobState};
use crate::provider::ProviderStatus;
use crate::routing::Backend;
use nova_core::{Dimensions, JobId};
use serde::{Deserialize, Serialize};

/// An incoming content request. Not persisted beyond job creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Missing keys authenticate as empty and are rejected as unauthorized
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub prompt: String,
    /// Optional reference image passed to the classifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// What the dispatcher did with a request
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    /// The job as it was when the dispatch call returned
    pub job: Job,
    pub message: String,
}

/// Body of a successful dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub job_id: JobId,
    pub status: JobState,
    pub worker: Backend,
    pub dimensions: Dimensions,
    pub message: String,
}

impl From<DispatchReceipt> for DispatchResponse {
    fn from(receipt: DispatchReceipt) -> Self {
        Self {
            job_id: receipt.job.id,
            status: receipt.job.state,
            worker: receipt.job.backend,
            dimensions: receipt.job.spec.dimensions,
            message: receipt.message,
        }
    }
}

/// The work a claiming worker receives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkDescriptor {
    pub job_id: JobId,
    /// Refined prompt
    pub prompt: String,
    pub dimensions: Dimensions,
    pub output_name: String,
    /// Where the worker should upload its result
    pub output_prefix: String,
}

impl WorkDescriptor {
    pub fn for_job(job: &Job, output_prefix: &str) -> Self {
        Self {
            job_id: job.id,
            prompt: job.spec.refined_prompt.clone(),
            dimensions: job.spec.dimensions,
            output_name: job.output_name.clone(),
            output_prefix: format!("{}/{}", output_prefix, job.id),
        }
    }
}

/// Result of a poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Claimed(WorkDescriptor),
    NoWork,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// One provider's health line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub role: String,
    pub name: String,
    pub status: String,
    pub available: bool,
}

impl ProviderHealth {
    pub fn new(role: &str, name: &str, status: &ProviderStatus) -> Self {
        Self {
            role: role.to_string(),
            name: name.to_string(),
            status: status.to_string(),
            available: *status == ProviderStatus::Available,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub providers: Vec<ProviderHealth>,
    pub pending_queue_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::CallerId;
    use crate::spec::GenerationSpec;

    #[test]
    fn test_request_image_is_optional() {
        let req: GenerationRequest =
            serde_json::from_str(r#"{"api_key":"k","prompt":"glowing blue cube"}"#).unwrap();
        assert!(req.image_url.is_none());
        assert_eq!(req.prompt, "glowing blue cube");

        let keyless: GenerationRequest = serde_json::from_str(r#"{"prompt":"cube"}"#).unwrap();
        assert!(keyless.api_key.is_empty());
    }

    #[test]
    fn test_dispatch_response_shape() {
        let mut job = Job::new(
            CallerId::new("a"),
            "glowing blue cube",
            GenerationSpec::fallback("glowing blue cube"),
            Backend::WorkerPool,
        );
        job.transition(JobState::Queued).unwrap();
        let response = DispatchResponse::from(DispatchReceipt {
            job,
            message: "queued".to_string(),
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "queued");
        assert_eq!(value["worker"], "worker_pool");
        assert_eq!(value["dimensions"]["height"], 1.0);
    }
}
