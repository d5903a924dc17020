//! NovaForge pipeline
//!
//! Accepts natural-language content requests, classifies them into a
//! [`GenerationSpec`], routes each one to the cloud mesh service or the
//! worker-pool queue, and tracks the resulting [`Job`] through its
//! lifecycle. Workers pull queued jobs through [`Dispatcher::claim_next`]
//! and report back with [`Dispatcher::report`].

pub mod accounts;
pub mod api;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod job;
pub mod object_store;
pub mod provider;
pub mod providers;
pub mod queue;
pub mod routing;
pub mod spec;
pub mod store;

pub use accounts::{AccountRegistry, CallerId};
pub use api::{
    DispatchReceipt, DispatchResponse, ErrorBody, GenerationRequest, HealthReport, PollOutcome,
    WorkDescriptor,
};
pub use config::{CloudMeshMode, ForgeConfig};
pub use dispatcher::Dispatcher;
pub use job::{Job, JobState, ReportOutcome, WorkerReport};
pub use object_store::{LocalObjectStore, ObjectStore};
pub use provider::{Classifier, ConceptGenerator, MeshGenerator, ProviderStatus};
pub use providers::ProviderSet;
pub use queue::{QueueEntry, QueuePublisher};
pub use routing::{route, Backend};
pub use spec::{Category, Complexity, GenerationSpec};
pub use store::{FileJobStore, JobStore, MemoryJobStore};
