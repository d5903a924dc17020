//! Worker-pool queue on top of the object store
//!
//! Each WorkerPool job is published once as `queue/<job_id>.json`. When a
//! worker claims the job the entry is moved to `claimed/<job_id>.json`, so an
//! entry still under `queue/` is work no one has picked up yet.

use crate::job::Job;
use crate::object_store::ObjectStore;
use nova_core::{Dimensions, JobId, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const QUEUE_PREFIX: &str = "queue/";
pub const CLAIMED_PREFIX: &str = "claimed/";

/// Shape and size hints for the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainBlock {
    /// Asset category, lowercase
    #[serde(rename = "type")]
    pub kind: String,
    pub dimensions: Dimensions,
}

/// Durable descriptor of one WorkerPool job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub output_name: String,
    pub output_prefix: String,
    /// Refined prompt
    pub prompt: String,
    pub terrain: TerrainBlock,
}

impl QueueEntry {
    pub fn for_job(job: &Job, output_prefix: &str) -> Self {
        Self {
            job_id: job.id,
            output_name: job.output_name.clone(),
            output_prefix: format!("{}/{}", output_prefix, job.id),
            prompt: job.spec.refined_prompt.clone(),
            terrain: TerrainBlock {
                kind: job.spec.category.as_str().to_string(),
                dimensions: job.spec.dimensions,
            },
        }
    }

    /// Object key of a job's pending entry; depends only on the id
    pub fn object_key(job_id: &JobId) -> String {
        format!("{}{}.json", QUEUE_PREFIX, job_id)
    }

    pub fn claimed_key(job_id: &JobId) -> String {
        format!("{}{}.json", CLAIMED_PREFIX, job_id)
    }
}

/// Publishes and consumes queue entries
#[derive(Clone)]
pub struct QueuePublisher {
    store: Arc<dyn ObjectStore>,
    output_prefix: String,
}

impl QueuePublisher {
    pub fn new(store: Arc<dyn ObjectStore>, output_prefix: impl Into<String>) -> Self {
        Self {
            store,
            output_prefix: output_prefix.into(),
        }
    }

    /// Write the job's entry with a single put. Returns the object key.
    pub fn publish(&self, job: &Job) -> Result<String> {
        let entry = QueueEntry::for_job(job, &self.output_prefix);
        let key = QueueEntry::object_key(&job.id);
        let body = serde_json::to_vec_pretty(&entry)?;
        self.store.put(&key, &body)?;
        info!(job_id = %job.id, key = %key, output_name = %entry.output_name, "published queue entry");
        Ok(key)
    }

    /// Move a claimed job's entry out of the pending queue.
    ///
    /// Returns `None` when there was nothing to consume; that is logged,
    /// since the job record remains authoritative.
    pub fn consume(&self, job_id: &JobId) -> Result<Option<QueueEntry>> {
        let Some(bytes) = self.store.take(&QueueEntry::object_key(job_id))? else {
            warn!(job_id = %job_id, "claimed job has no queue entry");
            return Ok(None);
        };
        self.store.put(&QueueEntry::claimed_key(job_id), &bytes)?;
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "queue entry is not valid JSON");
                Ok(None)
            }
        }
    }

    /// Ids of jobs with an unconsumed entry
    pub fn pending(&self) -> Result<Vec<JobId>> {
        Ok(self
            .store
            .list(QUEUE_PREFIX)?
            .iter()
            .filter_map(|key| {
                key.strip_prefix(QUEUE_PREFIX)?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::CallerId;
    use crate::object_store::LocalObjectStore;
    use crate::routing::Backend;
    use crate::spec::{Category, Complexity, GenerationSpec};

    fn job() -> Job {
        Job::new(
            CallerId::new("tester"),
            "red rock canyon",
            GenerationSpec {
                refined_prompt: "red rock canyon, eroded sandstone".to_string(),
                dimensions: Dimensions::new(20.0, 100.0, 100.0),
                category: Category::Terrain,
                complexity: Complexity::Low,
            },
            Backend::WorkerPool,
        )
    }

    #[test]
    fn test_entry_wire_format() {
        let job = job();
        let entry = QueueEntry::for_job(&job, "outputs");
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["job_id"], job.id.to_string());
        assert_eq!(value["output_prefix"], format!("outputs/{}", job.id));
        assert_eq!(value["prompt"], "red rock canyon, eroded sandstone");
        assert_eq!(value["terrain"]["type"], "terrain");
        assert_eq!(value["terrain"]["dimensions"]["width"], 100.0);
        assert!(entry.output_name.starts_with("red_rock_canyon_"));
    }

    #[test]
    fn test_publish_and_consume() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path()));
        let queue = QueuePublisher::new(Arc::clone(&store), "outputs");
        let job = job();

        let key = queue.publish(&job).unwrap();
        assert_eq!(key, format!("queue/{}.json", job.id));
        assert_eq!(queue.pending().unwrap(), vec![job.id]);

        let entry = queue.consume(&job.id).unwrap().unwrap();
        assert_eq!(entry.job_id, job.id);
        assert!(queue.pending().unwrap().is_empty());
        assert!(store
            .get(&QueueEntry::claimed_key(&job.id))
            .unwrap()
            .is_some());

        // Second consume finds nothing
        assert!(queue.consume(&job.id).unwrap().is_none());
    }
}
