//! Generation service traits and result types
//!
//! Each external service the pipeline talks to sits behind one of these
//! traits so the dispatcher can be driven by remote clients or local mocks.

use crate::spec::GenerationSpec;
use nova_core::Result;
use std::fmt;

/// Status returned by a provider health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Available,
    Unavailable(String),
    NoApiKey,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderStatus::Available => write!(f, "available"),
            ProviderStatus::Unavailable(reason) => write!(f, "unavailable: {}", reason),
            ProviderStatus::NoApiKey => write!(f, "no api key"),
        }
    }
}

/// A mesh produced by the cloud mesh service
#[derive(Debug, Clone)]
pub struct GeneratedMesh {
    /// Remote task id, when the service has one
    pub task_id: Option<String>,
    /// Where the service published the model
    pub model_url: String,
    /// Downloaded GLB bytes
    pub glb: Vec<u8>,
}

/// Turns a raw prompt into a structured spec (reasoning service)
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn health_check(&self) -> ProviderStatus;

    /// Classify and refine a prompt. Errors are recovered by the caller
    /// with the fallback spec, see [`crate::classifier::classify`].
    fn refine(&self, prompt: &str, image_url: Option<&str>) -> Result<GenerationSpec>;
}

/// Produces a 2D reference image for the mesh stage
pub trait ConceptGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn health_check(&self) -> ProviderStatus;

    /// Generate a concept image and return its locator
    fn generate_concept(&self, prompt: &str) -> Result<String>;
}

/// Produces a 3D mesh, optionally seeded by a concept image
pub trait MeshGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn health_check(&self) -> ProviderStatus;

    /// Generate a mesh. Must fall back to prompt-only generation when
    /// `concept_image` is `None`.
    fn generate_mesh(&self, prompt: &str, concept_image: Option<&str>) -> Result<GeneratedMesh>;
}
