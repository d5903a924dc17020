//! Mock providers for offline runs and tests
//!
//! The classifier applies keyword heuristics, the concept generator returns a
//! placeholder locator, and the mesh generator builds a minimal valid GLB.
//! None of them touch the network.

use crate::provider::{Classifier, ConceptGenerator, GeneratedMesh, MeshGenerator, ProviderStatus};
use crate::spec::{Category, Complexity, GenerationSpec};
use nova_core::{Dimensions, NovaError, Result};

const CHARACTER_WORDS: &[&str] = &[
    "character", "person", "mercenary", "hero", "villain", "npc", "soldier", "knight", "robot",
    "creature", "wizard",
];
const TERRAIN_WORDS: &[&str] = &[
    "terrain", "landscape", "mountain", "island", "canyon", "valley", "desert", "forest", "cliff",
];
const DETAIL_WORDS: &[&str] = &["detailed", "intricate", "ornate", "complex", "hyperreal"];
const MAX_LOW_COMPLEXITY_WORDS: usize = 12;

/// Keyword-based classifier
#[derive(Default)]
pub struct MockClassifier;

impl MockClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Classifier for MockClassifier {
    fn name(&self) -> &str {
        "mock"
    }

    fn health_check(&self) -> ProviderStatus {
        ProviderStatus::Available
    }

    fn refine(&self, prompt: &str, _image_url: Option<&str>) -> Result<GenerationSpec> {
        let words: Vec<String> = prompt
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return Err(NovaError::Upstream("Empty prompt".to_string()));
        }

        let has_any = |set: &[&str]| words.iter().any(|w| set.contains(&w.as_str()));

        let category = if has_any(CHARACTER_WORDS) {
            Category::Character
        } else if has_any(TERRAIN_WORDS) {
            Category::Terrain
        } else {
            Category::Prop
        };

        let complexity = if has_any(DETAIL_WORDS) || words.len() > MAX_LOW_COMPLEXITY_WORDS {
            Complexity::High
        } else {
            Complexity::Low
        };

        let dimensions = match category {
            Category::Character => Dimensions::new(1.8, 0.6, 0.4),
            Category::Terrain => Dimensions::new(20.0, 100.0, 100.0),
            Category::Prop => Dimensions::UNIT,
        };

        Ok(GenerationSpec {
            refined_prompt: format!("{}, game-ready 3D asset", prompt.trim()),
            dimensions,
            category,
            complexity,
        })
    }
}

/// Concept generator returning a placeholder locator
#[derive(Default)]
pub struct MockConceptGenerator;

impl MockConceptGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl ConceptGenerator for MockConceptGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn health_check(&self) -> ProviderStatus {
        ProviderStatus::Available
    }

    fn generate_concept(&self, prompt: &str) -> Result<String> {
        let slug: String = prompt
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join("_")
            .to_lowercase()
            .replace(|c: char| !c.is_alphanumeric() && c != '_', "");
        Ok(format!("mock://concepts/{}.png", slug))
    }
}

/// Mesh generator producing a single-triangle GLB
#[derive(Default)]
pub struct MockMeshGenerator;

impl MockMeshGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl MeshGenerator for MockMeshGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn health_check(&self) -> ProviderStatus {
        ProviderStatus::Available
    }

    fn generate_mesh(&self, prompt: &str, concept_image: Option<&str>) -> Result<GeneratedMesh> {
        let glb = minimal_glb(prompt, concept_image)?;
        Ok(GeneratedMesh {
            task_id: None,
            model_url: "mock://meshes/model.glb".to_string(),
            glb,
        })
    }
}

/// Build a minimal valid glTF 2.0 binary holding one triangle. The prompt
/// and concept locator ride along in `asset.extras`.
pub fn minimal_glb(prompt: &str, concept_image: Option<&str>) -> Result<Vec<u8>> {
    let json = serde_json::json!({
        "asset": {
            "version": "2.0",
            "generator": "novaforge-mock",
            "extras": { "prompt": prompt, "concept": concept_image }
        },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": { "POSITION": 0 },
                "indices": 1
            }]
        }],
        "accessors": [
            {
                "bufferView": 0,
                "componentType": 5126,
                "count": 3,
                "type": "VEC3",
                "max": [1.0, 1.0, 0.0],
                "min": [-1.0, 0.0, 0.0]
            },
            {
                "bufferView": 1,
                "componentType": 5123,
                "count": 3,
                "type": "SCALAR",
                "max": [2],
                "min": [0]
            }
        ],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 }
        ],
        "buffers": [{ "byteLength": 44 }]
    });

    let mut json_chunk = serde_json::to_vec(&json)?;
    json_chunk.resize((json_chunk.len() + 3) & !3, b' ');

    let vertices: [f32; 9] = [-1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let indices: [u16; 3] = [0, 1, 2];

    let mut bin_chunk = Vec::with_capacity(44);
    for v in &vertices {
        bin_chunk.extend_from_slice(&v.to_le_bytes());
    }
    for i in &indices {
        bin_chunk.extend_from_slice(&i.to_le_bytes());
    }
    bin_chunk.resize((bin_chunk.len() + 3) & !3, 0);

    let total_len = 12 + 8 + json_chunk.len() + 8 + bin_chunk.len();
    let mut out = Vec::with_capacity(total_len);

    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total_len as u32).to_le_bytes());

    out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x4E4F534Au32.to_le_bytes()); // "JSON"
    out.extend_from_slice(&json_chunk);

    out.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x004E4942u32.to_le_bytes()); // "BIN\0"
    out.extend_from_slice(&bin_chunk);

    Ok(out)
}
