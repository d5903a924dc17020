//! Job persistence
//!
//! The job store is the authoritative record of every job. All mutation goes
//! through [`JobStore::update`], a read-modify-write that implementations run
//! under a single lock, so compare-and-transition and the worker claim are
//! linearizable. The file store's lock is an OS file lock on the job
//! directory, which also serializes separate processes (`serve` and any
//! number of `novaforge poll` workers) sharing one data directory.

use crate::job::{Job, JobState};
use nova_core::{JobId, NovaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Storage for job records, shared across request handlers and background tasks
pub trait JobStore: Send + Sync {
    /// Persist a new job. Fails if a job with the same id exists.
    fn insert(&self, job: &Job) -> Result<()>;

    fn get(&self, id: &JobId) -> Result<Option<Job>>;

    fn list(&self) -> Result<Vec<Job>>;

    /// Atomically apply `f` to a job. When `f` returns `Ok(true)` the change
    /// is persisted; `Ok(false)` leaves the stored record untouched and an
    /// error aborts without writing. Returns the job as it stands afterwards,
    /// or `None` if it does not exist.
    fn update(&self, id: &JobId, f: &mut dyn FnMut(&mut Job) -> Result<bool>)
        -> Result<Option<Job>>;

    /// Fetch a job or fail with `JobNotFound`
    fn load(&self, id: &JobId) -> Result<Job> {
        self.get(id)?
            .ok_or_else(|| NovaError::JobNotFound(id.to_string()))
    }

    /// Move a job from `expected` to `next` if it is still in `expected`.
    /// Returns the updated job, or `None` when the state had already moved on.
    fn compare_and_transition(
        &self,
        id: &JobId,
        expected: JobState,
        next: JobState,
    ) -> Result<Option<Job>> {
        let mut moved = false;
        let job = self.update(id, &mut |job| {
            if job.state != expected {
                return Ok(false);
            }
            job.transition(next)?;
            moved = true;
            Ok(true)
        })?;
        match job {
            Some(job) if moved => Ok(Some(job)),
            Some(_) => Ok(None),
            None => Err(NovaError::JobNotFound(id.to_string())),
        }
    }

    /// Claim the oldest queued job, moving it to `Processing`.
    ///
    /// Candidates are tried oldest first; a candidate taken by a concurrent
    /// claimant is skipped rather than reported as an error.
    fn claim_next_queued(&self) -> Result<Option<Job>> {
        let mut queued: Vec<Job> = self
            .list()?
            .into_iter()
            .filter(|j| j.state == JobState::Queued)
            .collect();
        queued.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        for candidate in queued {
            match self.compare_and_transition(
                &candidate.id,
                JobState::Queued,
                JobState::Processing,
            )? {
                Some(job) => return Ok(Some(job)),
                None => debug!(job_id = %candidate.id, "claim lost, trying next candidate"),
            }
        }
        Ok(None)
    }
}

fn poisoned() -> NovaError {
    NovaError::Persistence("job store lock poisoned".to_string())
}

const LOCK_FILE: &str = ".store.lock";

/// Exclusive lock on a job directory, held across processes until dropped
struct DirLock {
    _file: File,
}

impl DirLock {
    fn acquire(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(root.join(LOCK_FILE))?;
        file.lock().map_err(|e| {
            NovaError::Persistence(format!("Failed to lock {}: {}", root.display(), e))
        })?;
        Ok(Self { _file: file })
    }
}

/// File-based job store: one `<id>.job.toml` per job
pub struct FileJobStore {
    root: PathBuf,
    lock: Mutex<()>,
}

#[derive(Serialize, Deserialize)]
struct JobFile {
    job: Job,
}

impl FileJobStore {
    /// Create a store rooted at `root`; the directory is created on first write
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| poisoned())
    }

    /// Guard for mutations: the in-process mutex, then the directory lock
    fn exclusive(&self) -> Result<(MutexGuard<'_, ()>, DirLock)> {
        let guard = self.guard()?;
        let dir_lock = DirLock::acquire(&self.root)?;
        Ok((guard, dir_lock))
    }

    fn path_for(&self, id: &JobId) -> PathBuf {
        self.root.join(format!("{}.job.toml", id))
    }

    fn read(&self, id: &JobId) -> Result<Option<Job>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let file: JobFile = toml::from_str(&content).map_err(|e| {
            NovaError::Persistence(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(file.job))
    }

    /// Write through a temp file and rename so readers never see a torn record
    fn write(&self, job: &Job) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let wrapper = JobFile { job: job.clone() };
        let content = toml::to_string_pretty(&wrapper).map_err(|e| {
            NovaError::Persistence(format!("Failed to serialize job {}: {}", job.id, e))
        })?;

        let path = self.path_for(&job.id);
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl JobStore for FileJobStore {
    fn insert(&self, job: &Job) -> Result<()> {
        let _locked = self.exclusive()?;
        if self.path_for(&job.id).exists() {
            return Err(NovaError::Persistence(format!(
                "Job already exists: {}",
                job.id
            )));
        }
        self.write(job)
    }

    fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let _guard = self.guard()?;
        self.read(id)
    }

    fn list(&self) -> Result<Vec<Job>> {
        let _guard = self.guard()?;
        let mut jobs = Vec::new();

        if !self.root.exists() {
            return Ok(jobs);
        }

        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_job = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".job.toml"))
                .unwrap_or(false);
            if !is_job {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            match toml::from_str::<JobFile>(&content) {
                Ok(file) => jobs.push(file.job),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable job file"),
            }
        }

        Ok(jobs)
    }

    fn update(
        &self,
        id: &JobId,
        f: &mut dyn FnMut(&mut Job) -> Result<bool>,
    ) -> Result<Option<Job>> {
        let _locked = self.exclusive()?;
        let Some(mut job) = self.read(id)? else {
            return Ok(None);
        };
        if f(&mut job)? {
            self.write(&job)?;
        }
        Ok(Some(job))
    }
}

/// In-memory job store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(NovaError::Persistence(format!(
                "Job already exists: {}",
                job.id
            )));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().map_err(|_| poisoned())?;
        Ok(jobs.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().map_err(|_| poisoned())?;
        Ok(jobs.values().cloned().collect())
    }

    fn update(
        &self,
        id: &JobId,
        f: &mut dyn FnMut(&mut Job) -> Result<bool>,
    ) -> Result<Option<Job>> {
        let mut jobs = self.jobs.lock().map_err(|_| poisoned())?;
        let Some(stored) = jobs.get_mut(id) else {
            return Ok(None);
        };
        // Work on a copy so an aborted update leaves the record untouched
        let mut job = stored.clone();
        if f(&mut job)? {
            *stored = job.clone();
        }
        Ok(Some(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::CallerId;
    use crate::routing::Backend;
    use crate::spec::GenerationSpec;
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};

    fn queued_job(prompt: &str, age_secs: i64) -> Job {
        let mut job = Job::new(
            CallerId::new("tester"),
            prompt,
            GenerationSpec::fallback(prompt),
            Backend::WorkerPool,
        );
        job.transition(JobState::Queued).unwrap();
        job.created_at = job.created_at - Duration::seconds(age_secs);
        job
    }

    fn stores() -> Vec<(Arc<dyn JobStore>, Option<tempfile::TempDir>)> {
        let dir = tempfile::tempdir().unwrap();
        let memory: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let file: Arc<dyn JobStore> = Arc::new(FileJobStore::new(dir.path().join("jobs")));
        vec![(memory, None), (file, Some(dir))]
    }

    #[test]
    fn test_insert_get_list() {
        for (store, _dir) in stores() {
            let job = queued_job("stone bench", 0);
            store.insert(&job).unwrap();
            assert!(store.insert(&job).is_err());

            let loaded = store.load(&job.id).unwrap();
            assert_eq!(loaded.id, job.id);
            assert_eq!(loaded.state, JobState::Queued);
            assert_eq!(store.list().unwrap().len(), 1);

            assert!(matches!(
                store.load(&JobId::new()),
                Err(NovaError::JobNotFound(_))
            ));
        }
    }

    #[test]
    fn test_compare_and_transition() {
        for (store, _dir) in stores() {
            let job = queued_job("crate", 0);
            store.insert(&job).unwrap();

            let moved = store
                .compare_and_transition(&job.id, JobState::Queued, JobState::Processing)
                .unwrap();
            assert_eq!(moved.map(|j| j.state), Some(JobState::Processing));

            let stale = store
                .compare_and_transition(&job.id, JobState::Queued, JobState::Processing)
                .unwrap();
            assert!(stale.is_none());

            let missing =
                store.compare_and_transition(&JobId::new(), JobState::Queued, JobState::Processing);
            assert!(matches!(missing, Err(NovaError::JobNotFound(_))));
        }
    }

    #[test]
    fn test_failed_update_does_not_write() {
        for (store, _dir) in stores() {
            let job = queued_job("barrel", 0);
            store.insert(&job).unwrap();
            let result = store.update(&job.id, &mut |j| {
                j.prompt = "changed".to_string();
                j.transition(JobState::Complete)?;
                Ok(true)
            });
            assert!(result.is_err());
            assert_eq!(store.load(&job.id).unwrap().prompt, "barrel");
        }
    }

    #[test]
    fn test_claim_takes_oldest_first() {
        for (store, _dir) in stores() {
            let newer = queued_job("newer", 10);
            let oldest = queued_job("oldest", 60);
            let mut cloud = queued_job("not queued", 120);
            cloud.state = JobState::Generating;
            store.insert(&newer).unwrap();
            store.insert(&oldest).unwrap();
            store.insert(&cloud).unwrap();

            assert_eq!(store.claim_next_queued().unwrap().unwrap().id, oldest.id);
            assert_eq!(store.claim_next_queued().unwrap().unwrap().id, newer.id);
            assert!(store.claim_next_queued().unwrap().is_none());
        }
    }

    #[test]
    fn test_concurrent_claims_are_exclusive() {
        const JOBS: usize = 5;
        const POLLERS: usize = 12;

        for (store, _dir) in stores() {
            for i in 0..JOBS {
                store.insert(&queued_job(&format!("job {}", i), i as i64)).unwrap();
            }

            let barrier = Arc::new(Barrier::new(POLLERS));
            let handles: Vec<_> = (0..POLLERS)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        store.claim_next_queued().unwrap().map(|j| j.id)
                    })
                })
                .collect();

            let results: Vec<Option<JobId>> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();
            let claimed: Vec<JobId> = results.iter().flatten().copied().collect();
            let unique: HashSet<JobId> = claimed.iter().copied().collect();

            assert_eq!(claimed.len(), JOBS);
            assert_eq!(unique.len(), JOBS);
            assert_eq!(results.iter().filter(|r| r.is_none()).count(), POLLERS - JOBS);
            assert!(store
                .list()
                .unwrap()
                .iter()
                .all(|j| j.state == JobState::Processing));
        }
    }

    #[test]
    fn test_claims_through_separate_file_stores_are_exclusive() {
        const ROUNDS: usize = 20;
        const POLLERS: usize = 6;

        for _ in 0..ROUNDS {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("jobs");
            let job = queued_job("shared job", 0);
            FileJobStore::new(&root).insert(&job).unwrap();

            // Each poller opens the directory itself, as a separate worker process would
            let barrier = Arc::new(Barrier::new(POLLERS));
            let handles: Vec<_> = (0..POLLERS)
                .map(|_| {
                    let store = FileJobStore::new(&root);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        store.claim_next_queued().unwrap().map(|j| j.id)
                    })
                })
                .collect();

            let winners: Vec<JobId> = handles
                .into_iter()
                .filter_map(|h| h.join().unwrap())
                .collect();
            assert_eq!(winners, vec![job.id]);
            assert_eq!(
                FileJobStore::new(&root).load(&job.id).unwrap().state,
                JobState::Processing
            );
        }
    }

    #[test]
    fn test_file_store_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path());
        store.insert(&queued_job("lamp", 0)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("broken.job.toml"), "not = [valid").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
