//! Orchestration core
//!
//! The dispatcher authenticates a request, classifies it, routes it to a
//! backend and records the resulting job. It also serves the worker side:
//! claiming queued jobs, accepting completion reports and requeueing.
//!
//! CloudMesh jobs run on a background thread (concept image, then mesh,
//! then archive); the dispatch call returns as soon as the job is recorded
//! unless the deployment selects blocking mode.

use crate::accounts::{AccountRegistry, CallerId};
use crate::api::{
    DispatchReceipt, GenerationRequest, HealthReport, PollOutcome, ProviderHealth, WorkDescriptor,
};
use crate::classifier::classify;
use crate::config::{CloudMeshMode, ForgeConfig};
use crate::job::{Job, JobState, ReportOutcome, WorkerReport};
use crate::object_store::{LocalObjectStore, ObjectStore};
use crate::providers::ProviderSet;
use crate::queue::QueuePublisher;
use crate::routing::{route, Backend};
use crate::store::{FileJobStore, JobStore};
use chrono::Utc;
use nova_core::{ContentHash, JobId, NovaError, Result};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// The orchestration core, shared behind an `Arc` by every interface
pub struct Dispatcher {
    config: Arc<ForgeConfig>,
    accounts: AccountRegistry,
    providers: ProviderSet,
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    queue: QueuePublisher,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<ForgeConfig>,
        accounts: AccountRegistry,
        providers: ProviderSet,
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let queue = QueuePublisher::new(Arc::clone(&objects), config.output_prefix());
        Self {
            config,
            accounts,
            providers,
            store,
            objects,
            queue,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Wire the dispatcher from configuration: file-backed job and object
    /// stores under the data directory, providers per `[providers]`.
    pub fn from_config(config: ForgeConfig) -> Result<Self> {
        let providers = ProviderSet::from_config(&config)?;
        let accounts = AccountRegistry::from_config(&config);
        if accounts.is_empty() {
            warn!("no accounts configured; every dispatch will be rejected");
        }
        let store: Arc<dyn JobStore> = Arc::new(FileJobStore::new(config.jobs_dir()));
        let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(config.objects_dir()));
        let dispatcher = Self::new(Arc::new(config), accounts, providers, store, objects);
        dispatcher.fail_abandoned_tasks()?;
        Ok(dispatcher)
    }

    /// Fail CloudMesh jobs whose generation task died with an earlier
    /// process. Only jobs untouched for `pipeline.abandoned_task_secs` are
    /// considered, so tasks still running in another process are left alone.
    pub fn fail_abandoned_tasks(&self) -> Result<usize> {
        let max_age = chrono::Duration::from_std(self.config.abandoned_task_age())
            .map_err(|e| NovaError::Config(format!("abandoned_task_secs out of range: {}", e)))?;
        let cutoff = Utc::now() - max_age;
        let abandoned = |job: &Job| {
            job.backend == Backend::CloudMesh
                && matches!(job.state, JobState::Generating | JobState::Processing)
                && job.updated_at < cutoff
        };

        let mut failed = 0;
        for candidate in self.store.list()?.into_iter().filter(|j| abandoned(j)) {
            let mut changed = false;
            self.store.update(&candidate.id, &mut |job| {
                if !abandoned(&*job) {
                    return Ok(false);
                }
                job.fail("generation task was interrupted before it finished")?;
                changed = true;
                Ok(true)
            })?;
            if changed {
                warn!(job_id = %candidate.id, state = %candidate.state, "failed abandoned cloud mesh job");
                failed += 1;
            }
        }
        Ok(failed)
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Accept a content request and record exactly one job for it
    pub fn dispatch(&self, request: &GenerationRequest) -> Result<DispatchReceipt> {
        let caller = self.accounts.authenticate(&request.api_key)?;

        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(NovaError::InvalidRequest("prompt is empty".to_string()));
        }

        let classification = classify(
            self.providers.classifier.as_ref(),
            prompt,
            request.image_url.as_deref(),
        );
        let backend = route(&classification.spec);
        let fallback_reason = classification.fallback_reason().map(str::to_string);
        let mut job = Job::new(caller, prompt, classification.spec, backend);

        info!(
            job_id = %job.id,
            owner = %job.owner,
            backend = %backend,
            category = %job.spec.category,
            complexity = %job.spec.complexity,
            fallback = fallback_reason.is_some(),
            "dispatching job"
        );

        let mut message = match backend {
            Backend::CloudMesh => self.dispatch_cloud_mesh(&mut job)?,
            Backend::WorkerPool => self.dispatch_worker_pool(&mut job)?,
        };
        if let Some(reason) = fallback_reason {
            message.push_str(&format!(
                " (classifier unavailable: {}; default spec used)",
                reason
            ));
        }

        Ok(DispatchReceipt { job, message })
    }

    fn dispatch_cloud_mesh(&self, job: &mut Job) -> Result<String> {
        job.transition(JobState::Generating)?;
        self.store.insert(job)?;

        let task = CloudMeshTask {
            providers: self.providers.clone(),
            store: Arc::clone(&self.store),
            objects: Arc::clone(&self.objects),
            output_prefix: self.config.output_prefix().to_string(),
        };

        if self.config.cloud_mesh_mode() == CloudMeshMode::Blocking {
            task.run(job.id);
            *job = self.store.load(&job.id)?;
            return Ok(match job.state {
                JobState::Complete => "Asset generated".to_string(),
                _ => format!(
                    "Generation failed: {}",
                    job.error.as_deref().unwrap_or("unknown error")
                ),
            });
        }

        let job_id = job.id;
        let spawned = std::thread::Builder::new()
            .name(format!("cloudmesh-{}", job_id))
            .spawn(move || task.run(job_id));

        match spawned {
            Ok(handle) => {
                match self.in_flight.lock() {
                    Ok(mut in_flight) => {
                        in_flight.retain(|h| !h.is_finished());
                        in_flight.push(handle);
                    }
                    Err(_) => error!(job_id = %job_id, "task list lock poisoned; task detached"),
                }
                Ok("Generation started on the cloud mesh service".to_string())
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "failed to start cloud mesh task");
                let reason = format!("could not start generation task: {}", e);
                if let Some(failed) = self.store.update(&job_id, &mut |j| {
                    j.fail(reason.clone())?;
                    Ok(true)
                })? {
                    *job = failed;
                }
                Ok(format!("Generation failed: {}", reason))
            }
        }
    }

    fn dispatch_worker_pool(&self, job: &mut Job) -> Result<String> {
        // Recorded as received first: pollers only claim queued jobs, so the
        // entry is in place before anyone can claim the job
        self.store.insert(job)?;
        let published = self.queue.publish(job);
        let job_id = job.id;
        *job = self
            .store
            .compare_and_transition(&job_id, JobState::Received, JobState::Queued)?
            .ok_or_else(|| {
                NovaError::Persistence(format!("job {} left the received state while publishing", job_id))
            })?;

        match published {
            Ok(_) => Ok("Queued for the worker pool".to_string()),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "queue publish failed; job left queued for requeue");
                Ok(format!(
                    "Queued, but publishing to the worker queue failed ({}); requeue the job to retry",
                    e
                ))
            }
        }
    }

    /// Claim the oldest queued job for a worker
    pub fn claim_next(&self) -> Result<PollOutcome> {
        let Some(job) = self.store.claim_next_queued()? else {
            debug!("poll found no work");
            return Ok(PollOutcome::NoWork);
        };

        if let Err(e) = self.queue.consume(&job.id) {
            warn!(job_id = %job.id, error = %e, "could not consume queue entry");
        }
        info!(job_id = %job.id, output_name = %job.output_name, "job claimed");

        Ok(PollOutcome::Claimed(WorkDescriptor::for_job(
            &job,
            self.config.output_prefix(),
        )))
    }

    /// Record a worker's outcome. Reports for finished jobs are ignored.
    pub fn report(&self, job_id: &JobId, report: &WorkerReport) -> Result<ReportOutcome> {
        let mut applied = false;
        let job = self
            .store
            .update(job_id, &mut |job| {
                applied = job.apply_report(report)?;
                Ok(applied)
            })?
            .ok_or_else(|| NovaError::JobNotFound(job_id.to_string()))?;

        if applied {
            info!(job_id = %job_id, state = %job.state, "worker report applied");
            Ok(ReportOutcome::Applied)
        } else {
            debug!(job_id = %job_id, state = %job.state, "report for finished job ignored");
            Ok(ReportOutcome::AlreadyFinal)
        }
    }

    /// Publish the queue entry of a still-queued job again
    pub fn requeue(&self, job_id: &JobId) -> Result<String> {
        let mut key = String::new();
        // Published under the store lock so a concurrent claim either sees
        // the entry or has already moved the job out of the queued state
        self.store
            .update(job_id, &mut |job| {
                if job.state != JobState::Queued {
                    return Err(NovaError::InvalidTransition {
                        from: job.state.to_string(),
                        to: JobState::Queued.to_string(),
                    });
                }
                key = self.queue.publish(job)?;
                Ok(false)
            })?
            .ok_or_else(|| NovaError::JobNotFound(job_id.to_string()))?;
        info!(job_id = %job_id, key = %key, "job requeued");
        Ok(key)
    }

    pub fn job(&self, job_id: &JobId) -> Result<Job> {
        self.store.load(job_id)
    }

    /// All jobs, newest first
    pub fn jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = self.store.list()?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    /// A caller's jobs, newest first
    pub fn history(&self, caller: &CallerId) -> Result<Vec<Job>> {
        let mut jobs = self.jobs()?;
        jobs.retain(|j| &j.owner == caller);
        Ok(jobs)
    }

    pub fn authenticate(&self, api_key: &str) -> Result<CallerId> {
        self.accounts.authenticate(api_key)
    }

    pub fn health(&self) -> Result<HealthReport> {
        let p = &self.providers;
        let providers = vec![
            ProviderHealth::new("classifier", p.classifier.name(), &p.classifier.health_check()),
            ProviderHealth::new("concept", p.concept.name(), &p.concept.health_check()),
            ProviderHealth::new("mesh", p.mesh.name(), &p.mesh.health_check()),
        ];
        Ok(HealthReport {
            status: "ok".to_string(),
            providers,
            pending_queue_entries: self.queue.pending()?.len(),
        })
    }

    /// Wait for every background generation task started so far
    pub fn wait_idle(&self) {
        let handles: Vec<JoinHandle<()>> = match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.drain(..).collect(),
            Err(_) => {
                error!("task list lock poisoned");
                return;
            }
        };
        for handle in handles {
            if handle.join().is_err() {
                error!("cloud mesh task panicked");
            }
        }
    }
}

/// Everything the background CloudMesh task needs, detached from the dispatcher
struct CloudMeshTask {
    providers: ProviderSet,
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    output_prefix: String,
}

impl CloudMeshTask {
    fn run(&self, job_id: JobId) {
        let Err(e) = self.generate(&job_id) else {
            return;
        };
        error!(job_id = %job_id, error = %e, "cloud mesh task aborted");

        let reason = format!("generation task aborted: {}", e);
        let marked = self.store.update(&job_id, &mut |job| {
            if job.state.is_terminal() {
                return Ok(false);
            }
            job.fail(reason.clone())?;
            Ok(true)
        });
        if let Err(e) = marked {
            error!(job_id = %job_id, error = %e, "could not record task failure");
        }
    }

    fn generate(&self, job_id: &JobId) -> Result<()> {
        let Some(job) = self
            .store
            .compare_and_transition(job_id, JobState::Generating, JobState::Processing)?
        else {
            warn!(job_id = %job_id, "job left generating state before the task started");
            return Ok(());
        };
        let prompt = job.spec.refined_prompt.as_str();

        let concept = match self.providers.concept.generate_concept(prompt) {
            Ok(url) => {
                debug!(job_id = %job_id, concept = %url, "concept image ready");
                Some(url)
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "concept generation failed, continuing prompt-only");
                None
            }
        };

        let outcome = self
            .providers
            .mesh
            .generate_mesh(prompt, concept.as_deref())
            .and_then(|mesh| {
                let key = format!(
                    "{}/{}/{}.glb",
                    self.output_prefix, job_id, job.output_name
                );
                self.objects.put(&key, &mesh.glb)?;
                let hash = ContentHash::from_bytes(&mesh.glb);
                debug!(job_id = %job_id, model_url = %mesh.model_url, key = %key, "mesh archived");
                Ok((key, hash))
            });

        match outcome {
            Ok((key, hash)) => {
                self.store.update(job_id, &mut |j| {
                    j.complete(key.clone(), Some(hash.to_prefixed_hex()))?;
                    Ok(true)
                })?;
                info!(job_id = %job_id, result = %key, "cloud mesh job complete");
            }
            Err(e) => {
                let reason = e.to_string();
                self.store.update(job_id, &mut |j| {
                    j.fail(reason.clone())?;
                    Ok(true)
                })?;
                warn!(job_id = %job_id, error = %reason, "cloud mesh job failed");
            }
        }
        Ok(())
    }
}
