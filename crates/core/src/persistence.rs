use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

pub const STATEMENT_KEY: &str = "statement";
pub const DDL_KEY: &str = "ddl";
pub const VIM_MODE_KEY: &str = "vim-mode";
pub const DISTRIBUTED_KEY: &str = "distributed";
pub const RESULT_TAB_KEY: &str = "result-tab";
pub const MID_BAR_POSITION_KEY: &str = "mid-bar-position";
pub const EDITOR_SPLIT_KEY: &str = "editor-split";
pub const LAST_REQUEST_KEY: &str = "last-request";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read stored value at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create state directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write stored value at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize value for `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable string storage, one JSON document per key.
pub trait KeyValueStore: Send + Sync + 'static {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn store(&self, key: &str, raw: &str) -> Result<(), PersistError>;
}

#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let file_stem: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_stem}.json"))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| PersistError::Read { path, source })
    }

    fn store(&self, key: &str, raw: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).map_err(|source| PersistError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(key);
        fs::write(&path, raw).map_err(|source| PersistError::Write { path, source })
    }
}

/// In-memory store that also records every durable write, in order.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn with_entry(self, key: &str, raw: &str) -> Self {
        lock(&self.entries).insert(key.to_string(), raw.to_string());
        self
    }

    #[must_use]
    pub fn writes(&self) -> Vec<(String, String)> {
        lock(&self.writes).clone()
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.raw(key))
    }

    fn store(&self, key: &str, raw: &str) -> Result<(), PersistError> {
        lock(&self.entries).insert(key.to_string(), raw.to_string());
        lock(&self.writes).push((key.to_string(), raw.to_string()));
        Ok(())
    }
}

/// What gets written when a value is initialized with an override.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverridePolicy {
    /// Keep the stored baseline: the caller's default is written, the
    /// override only lives in memory until it is next persisted.
    #[default]
    PersistDefault,
    PersistOverride,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Key/value state with an immediate in-memory copy and a debounced durable
/// copy. Only the last value of a burst of writes to a key reaches the store.
pub struct PersistedState<S: KeyValueStore> {
    store: Arc<S>,
    debounce: Duration,
    override_policy: OverridePolicy,
    values: Mutex<HashMap<String, Value>>,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl<S: KeyValueStore + std::fmt::Debug> std::fmt::Debug for PersistedState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedState")
            .field("store", &self.store)
            .field("debounce", &self.debounce)
            .field("override_policy", &self.override_policy)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore> PersistedState<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            debounce: DEFAULT_DEBOUNCE,
            override_policy: OverridePolicy::default(),
            values: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_override_policy(mut self, policy: OverridePolicy) -> Self {
        self.override_policy = policy;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current value for `key`, falling back to `default` when nothing usable
    /// is stored. Never fails.
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        if let Some(value) = lock(&self.values).get(key).cloned() {
            if let Ok(parsed) = serde_json::from_value(value) {
                return parsed;
            }
        }

        let raw = match self.store.load(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(error) => {
                debug!(key, %error, "stored value unavailable, using default");
                return default;
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => match serde_json::from_value(value.clone()) {
                Ok(parsed) => {
                    lock(&self.values).insert(key.to_string(), value);
                    parsed
                }
                Err(error) => {
                    debug!(key, %error, "stored value has unexpected shape, using default");
                    default
                }
            },
            Err(error) => {
                debug!(key, %error, "stored value is not JSON, using default");
                default
            }
        }
    }

    /// Initial value for `key`. A present `override_value` wins over both the
    /// default and the stored value; what gets written to the store in that
    /// case follows the configured [`OverridePolicy`].
    pub fn init<T: Serialize + DeserializeOwned>(
        &self,
        key: &str,
        default: T,
        override_value: Option<T>,
    ) -> T {
        let Some(override_value) = override_value else {
            return self.read(key, default);
        };

        let baseline = match self.override_policy {
            OverridePolicy::PersistDefault => serde_json::to_string(&default),
            OverridePolicy::PersistOverride => serde_json::to_string(&override_value),
        };
        match baseline {
            Ok(raw) => {
                if let Err(error) = self.store.store(key, &raw) {
                    warn!(key, %error, "failed to write baseline value");
                }
            }
            Err(error) => warn!(key, %error, "failed to serialize baseline value"),
        }

        if let Ok(value) = serde_json::to_value(&override_value) {
            lock(&self.values).insert(key.to_string(), value);
        }
        override_value
    }

    /// Updates the in-memory value now and schedules the durable write.
    ///
    /// A later call for the same key within the debounce window replaces the
    /// scheduled write. Outside a tokio runtime the write happens immediately.
    pub fn persist<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PersistError> {
        let value = serde_json::to_value(value).map_err(|source| PersistError::Serialize {
            key: key.to_string(),
            source,
        })?;
        let raw = value.to_string();
        lock(&self.values).insert(key.to_string(), value);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return self.store.store(key, &raw);
        };

        let store = Arc::clone(&self.store);
        let debounce = self.debounce;
        let owned_key = key.to_string();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(error) = store.store(&owned_key, &raw) {
                warn!(key = owned_key.as_str(), %error, "failed to persist value");
            }
        });

        if let Some(previous) = lock(&self.pending).insert(key.to_string(), handle) {
            previous.abort();
        }
        Ok(())
    }

    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        lock(&self.pending)
            .values()
            .any(|handle| !handle.is_finished())
    }

    /// Writes every still-pending value immediately.
    pub fn flush(&self) -> Result<(), PersistError> {
        let pending: Vec<String> = lock(&self.pending)
            .drain()
            .filter_map(|(key, handle)| {
                let was_pending = !handle.is_finished();
                handle.abort();
                was_pending.then_some(key)
            })
            .collect();

        let values = lock(&self.values);
        for key in pending {
            if let Some(value) = values.get(&key) {
                self.store.store(&key, &value.to_string())?;
            }
        }
        Ok(())
    }
}
