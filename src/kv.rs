//! String key-value storage with expiry.
//!
//! The session keeps its model and provider selection, draft input, and API
//! keys here so they survive a restart.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utf8path::Path;

use crate::{Error, Result};

/// Key holding the selected model.
pub const SELECTED_MODEL_KEY: &str = "selectedModel";
/// Key holding the selected provider name.
pub const SELECTED_PROVIDER_KEY: &str = "selectedProvider";
/// Key holding the unsent draft input.
pub const CACHED_PROMPT_KEY: &str = "cachedPrompt";
/// Key holding a JSON object of per-provider API keys.
pub const API_KEYS_KEY: &str = "apiKeys";

/// String storage where every value may expire.
pub trait KeyValueStore: Send + Sync {
    /// The value under `key`, unless missing or expired.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`; `expires_in_days` of `None` never expires.
    fn set(&self, key: &str, value: &str, expires_in_days: Option<u32>) -> Result<()>;

    /// Remove `key`.
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Entry {
    value: String,
    #[serde(default, with = "crate::utils::time")]
    expires: Option<OffsetDateTime>,
}

impl Entry {
    fn new(value: &str, expires_in_days: Option<u32>) -> Self {
        Self {
            value: value.to_string(),
            expires: crate::utils::time::expiry_after_days(expires_in_days),
        }
    }

    fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires.is_none_or(|expires| expires > now)
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.is_live(OffsetDateTime::now_utc()))
            .map(|entry| entry.value.clone())
    }

    fn set(&self, key: &str, value: &str, expires_in_days: Option<u32>) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), Entry::new(value, expires_in_days));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Store backed by a JSON file, rewritten on every change.
pub struct FileKeyValueStore {
    path: Path<'static>,
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl FileKeyValueStore {
    /// Open the store at `path`; a missing file starts empty. Expired entries
    /// are dropped on open.
    pub fn open(path: impl Into<String>) -> Result<Self> {
        let path: String = path.into();
        let path = Path::from(path.as_str()).into_owned();
        let mut entries: BTreeMap<String, Entry> = match File::open(path.as_str()) {
            Ok(file) => serde_json::from_reader(BufReader::new(file)).map_err(|err| {
                Error::serialization("failed to parse key-value store", Some(Box::new(err)))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(Error::io("failed to open key-value store", err)),
        };
        let now = OffsetDateTime::now_utc();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn save(&self, entries: &BTreeMap<String, Entry>) -> Result<()> {
        let file = File::create(self.path.as_str())
            .map_err(|err| Error::io("failed to write key-value store", err))?;
        serde_json::to_writer_pretty(BufWriter::new(file), entries).map_err(|err| {
            Error::serialization("failed to serialize key-value store", Some(Box::new(err)))
        })
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.is_live(OffsetDateTime::now_utc()))
            .map(|entry| entry.value.clone())
    }

    fn set(&self, key: &str, value: &str, expires_in_days: Option<u32>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), Entry::new(value, expires_in_days));
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}
