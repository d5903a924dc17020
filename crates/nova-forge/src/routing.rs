//! Backend routing policy

use crate::spec::{Category, Complexity, GenerationSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution backend a job is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Synchronous cloud mesh service (concept art, then mesh)
    CloudMesh,
    /// Pull-based worker pool fed through the object-store queue
    WorkerPool,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::CloudMesh => write!(f, "cloud_mesh"),
            Backend::WorkerPool => write!(f, "worker_pool"),
        }
    }
}

/// Pick the backend for a spec. Characters and high-complexity assets go
/// to the cloud mesh service; everything else goes to the worker pool.
pub fn route(spec: &GenerationSpec) -> Backend {
    if spec.category == Category::Character {
        return Backend::CloudMesh;
    }
    if spec.complexity == Complexity::High {
        return Backend::CloudMesh;
    }
    Backend::WorkerPool
}
