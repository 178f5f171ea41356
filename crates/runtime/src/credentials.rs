//! Credential resolution: environment first, then a local key file.

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Setting naming the key file.
pub const KEY_FILE_SETTING: &str = "LLM_KEY_FILE";

/// Key file used when `LLM_KEY_FILE` is unset.
pub const DEFAULT_KEY_FILE: &str = "config/keys.local.json";

/// Source of environment-style settings.
pub trait EnvSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed in-memory settings.
#[derive(Debug, Clone, Default)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// Lazily loaded JSON key file.
///
/// Starts unloaded. The first lookup loads the file; a lookup that misses
/// reloads it, so keys added after startup are picked up.
#[derive(Debug)]
pub struct KeyStore {
    path: PathBuf,
    cache: RwLock<Option<HashMap<String, String>>>,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let cached = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.as_ref().and_then(|keys| keys.get(name).cloned()));
        if cached.is_some() {
            return cached;
        }

        let keys = load_keys(&self.path);
        let value = keys.get(name).cloned();
        match self.cache.write() {
            Ok(mut cache) => *cache = Some(keys),
            Err(poisoned) => *poisoned.into_inner() = Some(keys),
        }
        value
    }
}

/// Missing, unreadable or malformed files all yield an empty map.
fn load_keys(path: &Path) -> HashMap<String, String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "key file not readable");
            return HashMap::new();
        }
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect(),
        Ok(_) => {
            warn!(path = %path.display(), "key file is not a JSON object, ignoring");
            HashMap::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "key file is not valid JSON, ignoring");
            HashMap::new()
        }
    }
}

/// Resolves named settings from an [`EnvSource`] and a [`KeyStore`].
pub struct CredentialResolver<E = ProcessEnv> {
    env: E,
    store: KeyStore,
}

impl<E: EnvSource> CredentialResolver<E> {
    pub fn new(env: E, store: KeyStore) -> Self {
        Self { env, store }
    }

    /// Key file location comes from `LLM_KEY_FILE` in `env`.
    pub fn from_env(env: E) -> Self {
        let path = env
            .var(KEY_FILE_SETTING)
            .unwrap_or_else(|| DEFAULT_KEY_FILE.to_string());
        Self::new(env, KeyStore::new(path))
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    pub fn resolve(&self, name: &str) -> Option<String> {
        self.env.var(name).or_else(|| self.store.get(name))
    }
}

impl<E> std::fmt::Debug for CredentialResolver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("store", &self.store.path)
            .finish_non_exhaustive()
    }
}
