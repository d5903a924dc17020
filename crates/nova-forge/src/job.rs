//! Job records and their lifecycle
//!
//! A job is created once per accepted request and moves through
//! `Received -> {Generating | Queued} -> Processing -> {Complete | Failed}`.
//! Every state change goes through [`Job::transition`], which rejects any
//! edge not in the lifecycle graph.

use crate::accounts::CallerId;
use crate::routing::Backend;
use crate::spec::GenerationSpec;
use chrono::{DateTime, Utc};
use nova_core::{JobId, NovaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const OUTPUT_NAME_WORDS: usize = 5;
const OUTPUT_NAME_MAX_LEN: usize = 48;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Received,
    Generating,
    Queued,
    Processing,
    Complete,
    Failed,
}

impl JobState {
    /// Whether `self -> next` is an edge of the lifecycle graph
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Received, Generating)
                | (Received, Queued)
                | (Received, Failed)
                | (Generating, Processing)
                | (Generating, Failed)
                | (Queued, Processing)
                | (Processing, Complete)
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Generating => "generating",
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked generation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: CallerId,
    /// The prompt as the caller sent it
    pub prompt: String,
    pub backend: Backend,
    pub state: JobState,
    /// Human-readable, non-unique label
    pub output_name: String,
    /// Where the finished asset lives; set on completion
    #[serde(default)]
    pub result_locator: Option<String>,
    /// `sha256:` hash of the archived result, when the pipeline stored it
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub spec: GenerationSpec,
}

impl Job {
    /// Create a job in the `Received` state
    pub fn new(owner: CallerId, prompt: &str, spec: GenerationSpec, backend: Backend) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner,
            prompt: prompt.to_string(),
            output_name: derive_output_name(prompt, now),
            backend,
            state: JobState::Received,
            result_locator: None,
            content_hash: None,
            error: None,
            created_at: now,
            updated_at: now,
            spec,
        }
    }

    /// Move to `next`, or fail with `InvalidTransition`
    pub fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(NovaError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the job failed with an error message
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(JobState::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Mark the job complete with its result
    pub fn complete(&mut self, result_locator: String, content_hash: Option<String>) -> Result<()> {
        self.transition(JobState::Complete)?;
        self.result_locator = Some(result_locator);
        self.content_hash = content_hash;
        Ok(())
    }

    /// Apply a worker report. Returns `false` when the job was already
    /// terminal and nothing changed.
    pub fn apply_report(&mut self, report: &WorkerReport) -> Result<bool> {
        if self.state.is_terminal() {
            return Ok(false);
        }
        match report {
            WorkerReport::Complete { result_locator } => {
                self.complete(result_locator.clone(), None)?
            }
            WorkerReport::Failed { error } => {
                // Only a claimed job can be failed by its worker
                if self.state != JobState::Processing {
                    return Err(NovaError::InvalidTransition {
                        from: self.state.to_string(),
                        to: JobState::Failed.to_string(),
                    });
                }
                self.fail(error.clone())?
            }
        }
        Ok(true)
    }
}

/// Outcome a worker sends back for a claimed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerReport {
    Complete { result_locator: String },
    Failed { error: String },
}

/// What a report did to the job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    Applied,
    /// The job was already Complete or Failed; nothing changed
    AlreadyFinal,
}

/// Build a label like `glowing_blue_cube_20261019T120000` from the first
/// few words of the prompt and a UTC timestamp.
pub fn derive_output_name(prompt: &str, at: DateTime<Utc>) -> String {
    let words: Vec<String> = prompt
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|w| !w.is_empty())
        .take(OUTPUT_NAME_WORDS)
        .collect();

    let mut stem = words.join("_");
    if stem.len() > OUTPUT_NAME_MAX_LEN {
        stem.truncate(OUTPUT_NAME_MAX_LEN);
        while stem.ends_with('_') {
            stem.pop();
        }
    }
    if stem.is_empty() {
        stem = "asset".to_string();
    }

    format!("{}_{}", stem, at.format("%Y%m%dT%H%M%S"))
}
