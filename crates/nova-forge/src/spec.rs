//! Generation specs produced by the classifier
//!
//! The classifier answers with loosely-typed JSON. It is parsed here into a
//! strict [`GenerationSpec`]; anything that does not validate is rejected so
//! the caller can substitute [`GenerationSpec::fallback`].

use nova_core::{Dimensions, NovaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of asset the prompt describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Character,
    Prop,
    Terrain,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Character, Category::Prop, Category::Terrain];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Character => "character",
            Category::Prop => "prop",
            Category::Terrain => "terrain",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = NovaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "character" => Ok(Category::Character),
            "prop" => Ok(Category::Prop),
            "terrain" => Ok(Category::Terrain),
            other => Err(NovaError::Serialization(format!(
                "Unknown category '{}'",
                other
            ))),
        }
    }
}

/// How demanding the asset is to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Complexity {
    Low,
    High,
}

impl Complexity {
    pub const ALL: [Complexity; 2] = [Complexity::Low, Complexity::High];
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Low => f.write_str("low"),
            Complexity::High => f.write_str("high"),
        }
    }
}

impl FromStr for Complexity {
    type Err = NovaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Complexity::Low),
            "high" => Ok(Complexity::High),
            other => Err(NovaError::Serialization(format!(
                "Unknown complexity '{}'",
                other
            ))),
        }
    }
}

/// Structured description of what to generate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSpec {
    /// Prompt rewritten by the classifier for the generation backends
    pub refined_prompt: String,
    pub dimensions: Dimensions,
    pub category: Category,
    pub complexity: Complexity,
}

/// Shape the classifier is asked to answer with
#[derive(Debug, Deserialize)]
struct RawSpec {
    #[serde(alias = "prompt", alias = "stylized_prompt")]
    refined_prompt: String,
    dimensions: RawDimensions,
    category: String,
    complexity: String,
}

#[derive(Debug, Deserialize)]
struct RawDimensions {
    height: f64,
    width: f64,
    depth: f64,
}

impl GenerationSpec {
    /// The spec used whenever classification fails: a unit-sized, low
    /// complexity prop carrying the raw prompt unchanged.
    pub fn fallback(prompt: &str) -> Self {
        Self {
            refined_prompt: prompt.trim().to_string(),
            dimensions: Dimensions::UNIT,
            category: Category::Prop,
            complexity: Complexity::Low,
        }
    }

    /// Parse and validate a classifier answer.
    ///
    /// Accepts a bare JSON object or one wrapped in a Markdown code fence.
    pub fn parse_response(text: &str) -> Result<Self> {
        let body = strip_code_fence(text);
        let raw: RawSpec = serde_json::from_str(body)
            .map_err(|e| NovaError::Serialization(format!("Invalid classifier JSON: {}", e)))?;

        let refined_prompt = raw.refined_prompt.trim().to_string();
        if refined_prompt.is_empty() {
            return Err(NovaError::Serialization(
                "Classifier returned an empty prompt".to_string(),
            ));
        }

        let dimensions = Dimensions::new(
            raw.dimensions.height,
            raw.dimensions.width,
            raw.dimensions.depth,
        );
        if !dimensions.is_valid() {
            return Err(NovaError::Serialization(format!(
                "Classifier returned invalid dimensions: {:?}",
                dimensions
            )));
        }

        Ok(Self {
            refined_prompt,
            dimensions,
            category: raw.category.parse()?,
            complexity: raw.complexity.parse()?,
        })
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an info string such as ```json
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_spec() {
        let spec = GenerationSpec::fallback("  glowing blue cube ");
        assert_eq!(spec.refined_prompt, "glowing blue cube");
        assert_eq!(spec.dimensions, Dimensions::UNIT);
        assert_eq!(spec.category, Category::Prop);
        assert_eq!(spec.complexity, Complexity::Low);
    }

    #[test]
    fn test_parse_valid_response() {
        let json = r#"{
            "refined_prompt": "A battle-worn cyberpunk mercenary, chrome arm",
            "dimensions": {"height": 1.85, "width": 0.7, "depth": 0.45},
            "category": "Character",
            "complexity": "high",
            "notes": "ignored"
        }"#;
        let spec = GenerationSpec::parse_response(json).unwrap();
        assert_eq!(spec.category, Category::Character);
        assert_eq!(spec.complexity, Complexity::High);
        assert_eq!(spec.dimensions.height, 1.85);
    }

    #[test]
    fn test_parse_fenced_response_with_alias() {
        let text = "```json\n{\"prompt\": \"mossy boulder\", \"dimensions\": {\"height\": 2, \"width\": 3, \"depth\": 2}, \"category\": \"prop\", \"complexity\": \"low\"}\n```";
        let spec = GenerationSpec::parse_response(text).unwrap();
        assert_eq!(spec.refined_prompt, "mossy boulder");
        assert_eq!(spec.dimensions, Dimensions::new(2.0, 3.0, 2.0));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(GenerationSpec::parse_response("not json").is_err());
        assert!(GenerationSpec::parse_response(r#"{"refined_prompt": "x"}"#).is_err());
        let bad_category = r#"{"refined_prompt": "x", "dimensions": {"height": 1, "width": 1, "depth": 1}, "category": "Vehicle", "complexity": "Low"}"#;
        assert!(GenerationSpec::parse_response(bad_category).is_err());
        let bad_dims = r#"{"refined_prompt": "x", "dimensions": {"height": -1, "width": 1, "depth": 1}, "category": "Prop", "complexity": "Low"}"#;
        assert!(GenerationSpec::parse_response(bad_dims).is_err());
        let empty_prompt = r#"{"refined_prompt": "  ", "dimensions": {"height": 1, "width": 1, "depth": 1}, "category": "Prop", "complexity": "Low"}"#;
        assert!(GenerationSpec::parse_response(empty_prompt).is_err());
    }
}
