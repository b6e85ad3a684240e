//! File-backed project variable store with an mtime-checked LRU cache.
//!
//! Entries are keyed by canonical path and hold the value together with the
//! file modification time seen when it was read. A lookup re-stats the file
//! and reloads only when the file is newer. Disk reads happen outside the
//! cache lock.

use crate::domain::error::{ProjectStoreError, VariableValidationError};
use crate::domain::lru::{CacheStats, LruCache};
use crate::domain::project_vars::{ProjectVariables, FILE_SUFFIX};
use crate::ports::variable_store_port::VariableStorePort;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub use crate::domain::config_validation::DEFAULT_PROJECT_CACHE_CAPACITY;

struct Entry {
    value: Arc<ProjectVariables>,
    mtime: SystemTime,
}

struct Inner {
    entries: LruCache<PathBuf, Entry>,
    hits: u64,
    misses: u64,
}

pub struct ProjectVariableStore {
    inner: Mutex<Inner>,
}

impl Default for ProjectVariableStore {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT_CACHE_CAPACITY)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> ProjectStoreError {
    if err.kind() == ErrorKind::NotFound {
        ProjectStoreError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        ProjectStoreError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}

/// Canonical path and current modification time.
fn stat(path: &Path) -> Result<(PathBuf, SystemTime), ProjectStoreError> {
    let resolved = fs::canonicalize(path).map_err(|e| io_error(path, e))?;
    let mtime = fs::metadata(&resolved)
        .and_then(|m| m.modified())
        .map_err(|e| io_error(&resolved, e))?;
    Ok((resolved, mtime))
}

fn read_file(path: &Path) -> Result<ProjectVariables, ProjectStoreError> {
    let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    ProjectVariables::from_json_str(&text).map_err(|e| ProjectStoreError::Invalid(e.at_path(path)))
}

/// `<dir>/<project>.cel_variables.json`
pub fn variables_path(dir: &Path, project_name: &str) -> PathBuf {
    dir.join(format!("{}{}", project_name, FILE_SUFFIX))
}

pub fn is_variables_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(FILE_SUFFIX))
}

impl ProjectVariableStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load(&self, path: &Path) -> Result<Arc<ProjectVariables>, ProjectStoreError> {
        let (resolved, mtime) = stat(path)?;
        {
            let mut inner = self.lock();
            let fresh = inner
                .entries
                .get(&resolved)
                .filter(|entry| mtime <= entry.mtime)
                .map(|entry| Arc::clone(&entry.value));
            if let Some(value) = fresh {
                inner.hits += 1;
                debug!(path = %resolved.display(), "project variables cache hit");
                return Ok(value);
            }
            inner.misses += 1;
        }

        let value = Arc::new(read_file(&resolved)?);
        debug!(
            path = %resolved.display(),
            variables = value.len(),
            "project variables loaded"
        );
        self.store_entry(resolved, Arc::clone(&value), mtime);
        Ok(value)
    }

    /// Write to a temp file in the target directory and rename it over the
    /// destination, then refresh the cache entry.
    pub fn save(&self, path: &Path, variables: &ProjectVariables) -> Result<(), ProjectStoreError> {
        let text = variables
            .to_json_string()
            .map_err(|e| ProjectStoreError::Invalid(e.at_path(path)))?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
        tmp.write_all(text.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| io_error(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| io_error(path, e.error))?;

        let (resolved, mtime) = stat(path)?;
        self.store_entry(resolved.clone(), Arc::new(variables.clone()), mtime);
        info!(
            path = %resolved.display(),
            variables = variables.len(),
            "project variables saved"
        );
        Ok(())
    }

    /// Same checks as `load`, without reading or filling the cache.
    pub fn validate_file(&self, path: &Path) -> Result<ProjectVariables, ProjectStoreError> {
        read_file(path)
    }

    /// Drop the cached entry for `path`; true when one existed.
    pub fn invalidate(&self, path: &Path) -> bool {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.lock().entries.remove(&key).is_some()
    }

    /// Drop all entries and reset counters.
    pub fn clear_cache(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        fs::canonicalize(path).is_ok_and(|key| self.lock().entries.contains(&key))
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
            maxsize: inner.entries.capacity(),
        }
    }

    fn store_entry(&self, key: PathBuf, value: Arc<ProjectVariables>, mtime: SystemTime) {
        let mut inner = self.lock();
        // a concurrent reload may already hold a newer file
        if inner.entries.peek(&key).is_some_and(|e| e.mtime > mtime) {
            return;
        }
        if let Some((evicted, _)) = inner.entries.insert(key, Entry { value, mtime }) {
            debug!(evicted = %evicted.display(), "project variables cache eviction");
        }
    }
}

impl VariableStorePort for ProjectVariableStore {
    fn load(&self, path: &Path) -> Result<Arc<ProjectVariables>, ProjectStoreError> {
        ProjectVariableStore::load(self, path)
    }

    fn save(&self, path: &Path, variables: &ProjectVariables) -> Result<(), ProjectStoreError> {
        ProjectVariableStore::save(self, path, variables)
    }

    fn stats(&self) -> CacheStats {
        ProjectVariableStore::stats(self)
    }
}

/// Reject a file name that the store would never pick up.
pub fn check_file_name(path: &Path) -> Result<(), VariableValidationError> {
    if is_variables_file(path) {
        Ok(())
    } else {
        Err(VariableValidationError::new(format!("file name must end with {}", FILE_SUFFIX)).at_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project_vars::ProjectVariable;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample() -> ProjectVariables {
        let mut vars = ProjectVariables::new("demo");
        vars.add_variable(ProjectVariable::new("entry_level", 95_000.0).unwrap().with_unit("USDT"))
            .unwrap();
        vars.add_variable(ProjectVariable::new("max_trades", 3i64).unwrap()).unwrap();
        vars
    }

    /// Push the file's mtime forward so coarse filesystem clocks still see a change.
    fn touch_later(path: &Path) {
        let later = SystemTime::now() + Duration::from_secs(5);
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(later).unwrap();
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = variables_path(dir.path(), "demo");
        let store = ProjectVariableStore::default();
        store.save(&path, &sample()).unwrap();
        let loaded = store.load(&path).unwrap();
        assert_eq!(*loaded, sample());
        // save filled the cache, so the load was a hit
        assert_eq!(store.stats().hits, 1);
        assert_eq!(store.stats().misses, 0);
    }

    #[test]
    fn reloads_when_file_is_newer() {
        let dir = TempDir::new().unwrap();
        let path = variables_path(dir.path(), "demo");
        let store = ProjectVariableStore::default();
        store.save(&path, &sample()).unwrap();

        let mut edited = sample();
        edited.update_value("max_trades", 7i64).unwrap();
        fs::write(&path, edited.to_json_string().unwrap()).unwrap();
        touch_later(&path);

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded.get("max_trades").unwrap().value.as_i64(), Some(7));
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let store = ProjectVariableStore::default();
        let err = store.load(Path::new("/nonexistent/x.cel_variables.json")).unwrap_err();
        assert!(matches!(err, ProjectStoreError::NotFound { .. }));
    }

    #[test]
    fn malformed_file_is_invalid_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.cel_variables.json");
        fs::write(&path, "{ not json").unwrap();
        let store = ProjectVariableStore::default();
        match store.load(&path).unwrap_err() {
            ProjectStoreError::Invalid(err) => assert!(err.path.is_some()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.stats().size, 0);
    }

    #[test]
    fn validate_file_leaves_cache_alone() {
        let dir = TempDir::new().unwrap();
        let path = variables_path(dir.path(), "demo");
        fs::write(&path, sample().to_json_string().unwrap()).unwrap();
        let store = ProjectVariableStore::default();
        assert_eq!(store.validate_file(&path).unwrap(), sample());
        assert_eq!(store.stats(), CacheStats { maxsize: 64, ..CacheStats::default() });
        assert!(!store.is_cached(&path));
    }

    #[test]
    fn lru_eviction_and_invalidate() {
        let dir = TempDir::new().unwrap();
        let store = ProjectVariableStore::new(2);
        let paths: Vec<PathBuf> = ["a", "b", "c"]
            .iter()
            .map(|n| variables_path(dir.path(), n))
            .collect();
        for p in &paths {
            store.save(p, &sample()).unwrap();
        }
        assert_eq!(store.stats().size, 2);
        assert!(!store.is_cached(&paths[0]));
        assert!(store.invalidate(&paths[2]));
        assert!(!store.invalidate(&paths[2]));
        store.clear_cache();
        assert_eq!(store.stats().size, 0);
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = variables_path(dir.path(), "demo");
        ProjectVariableStore::default().save(&path, &sample()).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn file_name_check() {
        assert!(check_file_name(Path::new("p.cel_variables.json")).is_ok());
        assert!(check_file_name(Path::new("p.json")).is_err());
    }
}
