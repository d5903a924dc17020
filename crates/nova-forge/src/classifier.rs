//! Classification with a guaranteed result

use crate::provider::Classifier;
use crate::spec::GenerationSpec;
use tracing::{debug, warn};

/// Where a spec came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    Classifier,
    /// The classifier failed; carries the reason
    Fallback(String),
}

/// A resolved spec plus its provenance
#[derive(Debug, Clone)]
pub struct Classification {
    pub spec: GenerationSpec,
    pub source: SpecSource,
}

impl Classification {
    /// Why the classifier's answer was not used, if it was not
    pub fn fallback_reason(&self) -> Option<&str> {
        match &self.source {
            SpecSource::Fallback(reason) => Some(reason),
            SpecSource::Classifier => None,
        }
    }
}

/// Classify a prompt, substituting the fallback spec on any failure.
/// Never fails.
pub fn classify(classifier: &dyn Classifier, prompt: &str, image_url: Option<&str>) -> Classification {
    match classifier.refine(prompt, image_url) {
        Ok(spec) => {
            debug!(
                classifier = classifier.name(),
                category = %spec.category,
                complexity = %spec.complexity,
                "prompt classified"
            );
            Classification {
                spec,
                source: SpecSource::Classifier,
            }
        }
        Err(e) => {
            warn!(classifier = classifier.name(), error = %e, "classification failed, using fallback spec");
            Classification {
                spec: GenerationSpec::fallback(prompt),
                source: SpecSource::Fallback(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderStatus;
    use crate::providers::mock::MockClassifier;
    use crate::spec::{Category, Complexity};
    use nova_core::{Dimensions, NovaError, Result};

    struct UnreachableClassifier;

    impl Classifier for UnreachableClassifier {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn health_check(&self) -> ProviderStatus {
            ProviderStatus::Unavailable("connection refused".to_string())
        }

        fn refine(&self, _prompt: &str, _image_url: Option<&str>) -> Result<GenerationSpec> {
            Err(NovaError::Upstream("connection refused".to_string()))
        }
    }

    #[test]
    fn test_classifier_result_is_used() {
        let c = classify(&MockClassifier::new(), "cyberpunk mercenary character", None);
        assert_eq!(c.fallback_reason(), None);
        assert_eq!(c.spec.category, Category::Character);
    }

    #[test]
    fn test_failure_yields_fallback() {
        let c = classify(&UnreachableClassifier, "glowing blue cube", Some("https://x/ref.png"));
        assert!(c.fallback_reason().unwrap().contains("connection refused"));
        assert_eq!(c.spec.category, Category::Prop);
        assert_eq!(c.spec.complexity, Complexity::Low);
        assert_eq!(c.spec.dimensions, Dimensions::UNIT);
        assert_eq!(c.spec.refined_prompt, "glowing blue cube");
    }
}
