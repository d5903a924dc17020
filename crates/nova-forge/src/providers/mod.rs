//! Provider registry
//!
//! Builds the set of service clients the dispatcher uses from configuration.

pub mod flux;
pub mod http;
pub mod meshy;
pub mod mock;
pub mod reasoning;

use crate::config::{ForgeConfig, FLUX, MESHY, REASONING};
use crate::provider::{Classifier, ConceptGenerator, MeshGenerator};
use nova_core::Result;
use std::sync::Arc;
use tracing::warn;

/// The three generation services, shared across requests and background tasks
#[derive(Clone)]
pub struct ProviderSet {
    pub classifier: Arc<dyn Classifier>,
    pub concept: Arc<dyn ConceptGenerator>,
    pub mesh: Arc<dyn MeshGenerator>,
}

impl ProviderSet {
    /// Wire providers from config. Mocks are used when requested; a disabled
    /// remote provider is replaced by its mock.
    pub fn from_config(config: &ForgeConfig) -> Result<Self> {
        if config.pipeline.use_mock_providers {
            return Ok(Self::mock());
        }

        let classifier: Arc<dyn Classifier> = if config.is_enabled(REASONING) {
            Arc::new(reasoning::ReasoningClassifier::from_config(config))
        } else {
            warn!("reasoning provider disabled, using mock classifier");
            Arc::new(mock::MockClassifier::new())
        };

        let concept: Arc<dyn ConceptGenerator> = if config.is_enabled(FLUX) {
            Arc::new(flux::FluxConceptGenerator::from_config(config))
        } else {
            warn!("flux provider disabled, using mock concept generator");
            Arc::new(mock::MockConceptGenerator::new())
        };

        let mesh: Arc<dyn MeshGenerator> = if config.is_enabled(MESHY) {
            Arc::new(meshy::MeshyMeshGenerator::from_config(config)?)
        } else {
            warn!("meshy provider disabled, using mock mesh generator");
            Arc::new(mock::MockMeshGenerator::new())
        };

        Ok(Self {
            classifier,
            concept,
            mesh,
        })
    }

    /// All-mock provider set
    pub fn mock() -> Self {
        Self {
            classifier: Arc::new(mock::MockClassifier::new()),
            concept: Arc::new(mock::MockConceptGenerator::new()),
            mesh: Arc::new(mock::MockMeshGenerator::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_flag_wires_mocks() {
        let mut config = ForgeConfig::default();
        config.pipeline.use_mock_providers = true;
        let set = ProviderSet::from_config(&config).unwrap();
        assert_eq!(set.classifier.name(), "mock");
        assert_eq!(set.concept.name(), "mock");
        assert_eq!(set.mesh.name(), "mock");
    }

    #[test]
    fn test_remote_mesh_requires_key() {
        let config = ForgeConfig::default();
        assert!(ProviderSet::from_config(&config).is_err());
    }
}
