//! Session file cache
//!
//! Two-tier byte cache: a volatile in-memory map for the session, plus an
//! optional durable directory store that survives restarts. Loads are
//! coalesced per key: concurrent callers for the same key share a single
//! loader invocation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use log::warn;

/// Fixed namespace for the durable tier under the cache root
const CACHE_NAMESPACE: &str = "filecache";

/// Error type for cache loads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The loader reported a failure
    Load(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Load(msg) => write!(f, "load failed: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

/// Shared completion slot for one in-flight load
struct LoadSlot {
    done: Mutex<Option<Result<Vec<u8>, CacheError>>>,
    cond: Condvar,
}

/// Handle to a `get_or_load` result
///
/// Either already resolved (cache hit) or waiting on a shared in-flight
/// load. `wait` blocks; `try_result` polls.
pub struct LoadHandle {
    state: HandleState,
}

enum HandleState {
    Ready(Result<Vec<u8>, CacheError>),
    Waiting(Arc<LoadSlot>),
}

impl LoadHandle {
    fn ready(result: Result<Vec<u8>, CacheError>) -> Self {
        Self {
            state: HandleState::Ready(result),
        }
    }

    fn waiting(slot: Arc<LoadSlot>) -> Self {
        Self {
            state: HandleState::Waiting(slot),
        }
    }

    /// Block until the load completes
    pub fn wait(self) -> Result<Vec<u8>, CacheError> {
        match self.state {
            HandleState::Ready(result) => result,
            HandleState::Waiting(slot) => {
                let mut done = lock(&slot.done);
                while done.is_none() {
                    done = slot
                        .cond
                        .wait(done)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                done.clone().unwrap_or_else(|| {
                    Err(CacheError::Load("load slot emptied unexpectedly".into()))
                })
            }
        }
    }

    /// Poll for completion without blocking
    pub fn try_result(&self) -> Option<Result<Vec<u8>, CacheError>> {
        match &self.state {
            HandleState::Ready(result) => Some(result.clone()),
            HandleState::Waiting(slot) => lock(&slot.done).clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct CacheInner {
    memory: HashMap<String, Vec<u8>>,
    in_flight: HashMap<String, Arc<LoadSlot>>,
}

/// Durable tier: one directory per cache root, keys mapped to path-safe
/// hex file names
#[derive(Debug, Clone)]
struct DurableStore {
    root: PathBuf,
}

impl DurableStore {
    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() * 2);
        for byte in key.as_bytes() {
            name.push_str(&format!("{:02x}", byte));
        }
        self.root.join(CACHE_NAMESPACE).join(name)
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("durable cache read failed for {:?}: {}", path, e);
                None
            }
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("durable cache mkdir failed for {:?}: {}", parent, e);
                return;
            }
        }
        if let Err(e) = std::fs::write(&path, bytes) {
            warn!("durable cache write failed for {:?}: {}", path, e);
        }
    }

    fn clear(&self) {
        let dir = self.root.join(CACHE_NAMESPACE);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("durable cache clear failed for {:?}: {}", dir, e),
        }
    }
}

/// Two-tier byte cache with request coalescing
///
/// Clones share the same underlying state. The in-flight map is the only
/// concurrency-control primitive in this core: loaders for distinct keys
/// run independently, same-key concurrent callers share one execution.
#[derive(Clone)]
pub struct FileCache {
    inner: Arc<Mutex<CacheInner>>,
    durable: Option<DurableStore>,
}

impl FileCache {
    /// Memory-only cache (no durable tier)
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                memory: HashMap::new(),
                in_flight: HashMap::new(),
            })),
            durable: None,
        }
    }

    /// Cache with a durable tier rooted at the given directory
    pub fn with_durable(root: impl Into<PathBuf>) -> Self {
        let mut cache = Self::new();
        cache.durable = Some(DurableStore { root: root.into() });
        cache
    }

    /// Look up a key: memory first, then the durable tier (which promotes
    /// the hit into memory). Identical bytes regardless of serving tier.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = lock(&self.inner);
        if let Some(bytes) = inner.memory.get(key) {
            return Some(bytes.clone());
        }
        let bytes = self.durable.as_ref()?.read(key)?;
        inner.memory.insert(key.to_string(), bytes.clone());
        Some(bytes)
    }

    /// Write-through both tiers
    pub fn set(&self, key: &str, bytes: Vec<u8>) {
        if let Some(durable) = &self.durable {
            durable.write(key, &bytes);
        }
        lock(&self.inner).memory.insert(key.to_string(), bytes);
    }

    /// Cached bytes, or run `loader` once per key across concurrent callers
    ///
    /// On success the result is cached write-through; on failure nothing is
    /// cached and the in-flight marker is cleared, so a later call retries.
    pub fn get_or_load<F>(&self, key: &str, loader: F) -> LoadHandle
    where
        F: FnOnce() -> Result<Vec<u8>, String> + Send + 'static,
    {
        let mut inner = lock(&self.inner);

        if let Some(bytes) = inner.memory.get(key) {
            return LoadHandle::ready(Ok(bytes.clone()));
        }
        if let Some(durable) = &self.durable {
            if let Some(bytes) = durable.read(key) {
                inner.memory.insert(key.to_string(), bytes.clone());
                return LoadHandle::ready(Ok(bytes));
            }
        }
        if let Some(slot) = inner.in_flight.get(key) {
            return LoadHandle::waiting(slot.clone());
        }

        let slot = Arc::new(LoadSlot {
            done: Mutex::new(None),
            cond: Condvar::new(),
        });
        inner.in_flight.insert(key.to_string(), slot.clone());
        drop(inner);

        let cache = self.clone();
        let slot_for_thread = slot.clone();
        let key = key.to_string();
        thread::spawn(move || {
            let result = loader().map_err(CacheError::Load);

            let mut inner = lock(&cache.inner);
            if let Ok(bytes) = &result {
                if let Some(durable) = &cache.durable {
                    durable.write(&key, bytes);
                }
                inner.memory.insert(key.clone(), bytes.clone());
            }
            inner.in_flight.remove(&key);
            drop(inner);

            *lock(&slot_for_thread.done) = Some(result);
            slot_for_thread.cond.notify_all();
        });

        LoadHandle::waiting(slot)
    }

    /// Drop the volatile tier only
    pub fn clear_memory(&self) {
        lock(&self.inner).memory.clear();
    }

    /// Erase the durable store entirely
    pub fn clear_persistent(&self) {
        if let Some(durable) = &self.durable {
            durable.clear();
        }
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}
