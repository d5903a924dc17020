//! Object storage backing the worker queue and archived results
//!
//! Keys are `/`-separated relative paths such as `queue/<job_id>.json`.

use nova_core::{NovaError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Key/value blob storage shared by the dispatcher and its background tasks
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object atomically
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove and return an object. When several callers race for the same
    /// key exactly one of them receives `Some`.
    fn take(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Keys starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Object store on the local filesystem
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Filesystem path of a key, rejecting keys that escape the root
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn collect_keys(&self, dir: &Path, prefix: &str, keys: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            if entry.file_type()?.is_dir() {
                self.collect_keys(&entry.path(), &key, keys)?;
            } else if !is_scratch_name(&name) {
                keys.push(key);
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = scratch_path(&path, "tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        // The rename is the linearization point: only one racer can move the file
        let taken = scratch_path(&path, "taken");
        match fs::rename(&path, &taken) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let bytes = fs::read(&taken)?;
        fs::remove_file(&taken)?;
        Ok(Some(bytes))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        if self.root.exists() {
            self.collect_keys(&self.root, "", &mut keys)?;
        }
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(NovaError::Persistence(format!(
            "Invalid object key: '{}'",
            key
        )));
    }
    Ok(())
}

fn scratch_path(path: &Path, tag: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}-{}", tag, uuid::Uuid::new_v4().simple()));
    PathBuf::from(name)
}

fn is_scratch_name(name: &str) -> bool {
    name.contains(".tmp-") || name.contains(".taken-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_put_get_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        store.put("queue/a.json", b"{}").unwrap();
        assert_eq!(store.get("queue/a.json").unwrap().unwrap(), b"{}");

        store.put("queue/a.json", b"[1]").unwrap();
        assert_eq!(store.get("queue/a.json").unwrap().unwrap(), b"[1]");
        assert!(store.get("queue/missing.json").unwrap().is_none());
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let store = LocalObjectStore::new("/tmp/unused");
        for key in ["", "/etc/passwd", "../x", "a/../../b", "a//b", "a\\b", "./a"] {
            assert!(store.path_for(key).is_err(), "{}", key);
        }
        assert!(store.path_for("outputs/job/model.glb").is_ok());
    }

    #[test]
    fn test_list_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("queue/b.json", b"b").unwrap();
        store.put("queue/a.json", b"a").unwrap();
        store.put("outputs/x/y.glb", b"glb").unwrap();

        assert_eq!(
            store.list("queue/").unwrap(),
            vec!["queue/a.json".to_string(), "queue/b.json".to_string()]
        );
        assert_eq!(store.list("").unwrap().len(), 3);
        assert!(store.list("claimed/").unwrap().is_empty());
    }

    #[test]
    fn test_take_removes_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("queue/a.json", b"payload").unwrap();

        assert_eq!(store.take("queue/a.json").unwrap().unwrap(), b"payload");
        assert!(store.take("queue/a.json").unwrap().is_none());
        assert!(store.list("queue/").unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_take_has_one_winner() {
        const RACERS: usize = 8;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalObjectStore::new(dir.path()));
        store.put("queue/job.json", b"only once").unwrap();

        let barrier = Arc::new(Barrier::new(RACERS));
        let handles: Vec<_> = (0..RACERS)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.take("queue/job.json").unwrap()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();
        assert_eq!(winners, 1);
    }
}
