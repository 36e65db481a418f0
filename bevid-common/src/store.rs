//! Write-through key-value persistence
//!
//! [`KeyValueStore`] keeps every entry in memory and rewrites its JSON file on
//! each mutation, so the file always mirrors the last successful write.
//! [`Dataset`] stores labeled training examples under a single key.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Error, Result};

/// File name of the store inside the root folder
pub const STORE_FILE_NAME: &str = "store.json";

/// Name of the dataset holding the user's labeled examples
pub const TRAINING_DATASET: &str = "alcohol-training";

/// JSON-file-backed key-value store
#[derive(Debug)]
pub struct KeyValueStore {
    /// Backing file; `None` keeps the store in memory only
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, Value>>,
}

impl KeyValueStore {
    /// Open the store at `path`, loading existing entries if the file exists
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        info!(
            "Opened key-value store {} ({} keys)",
            path.display(),
            entries.len()
        );

        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    /// Store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read and decode the value under `key`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Write `value` under `key` and persist
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    /// Remove `key`; returns whether it existed
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next).await?;
        *entries = next;
        Ok(true)
    }

    /// Remove `key` and return its decoded value under a single write lock
    pub async fn take<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut entries = self.entries.write().await;
        let Some(value) = entries.get(key) else {
            return Ok(None);
        };
        let decoded = serde_json::from_value(value.clone())?;
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next).await?;
        *entries = next;
        Ok(Some(decoded))
    }

    /// Read-modify-write `key` under a single write lock
    ///
    /// `f` receives the current value (if any) and returns the new value plus
    /// a result handed back to the caller.
    pub async fn update<T, R, F>(&self, key: &str, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> Result<(T, R)>,
    {
        let mut entries = self.entries.write().await;
        let current = match entries.get(key) {
            Some(value) => Some(serde_json::from_value(value.clone())?),
            None => None,
        };
        let (updated, result) = f(current)?;
        let mut next = entries.clone();
        next.insert(key.to_string(), serde_json::to_value(&updated)?);
        self.persist(&next).await?;
        *entries = next;
        Ok(result)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Atomic write: temp file in the same directory, then rename
    async fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(entries)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, path).await?;

        debug!("Persisted {} keys to {}", entries.len(), path.display());
        Ok(())
    }
}

/// One labeled training example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub id: Uuid,
    /// Feature vector produced by the external feature extractor
    pub x: Vec<f32>,
    /// Label
    pub y: String,
    /// Thumbnail data URL, if the upload widget produced one
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Example as submitted, before an id is assigned
#[derive(Debug, Clone, Deserialize)]
pub struct NewExample {
    pub x: Vec<f32>,
    pub y: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Number of examples per label, in label order
pub fn label_counts(examples: &[TrainingExample]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for example in examples {
        *counts.entry(example.y.clone()).or_insert(0) += 1;
    }
    counts
}

/// Named collection of training examples persisted in a [`KeyValueStore`]
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    store: Arc<KeyValueStore>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, store: Arc<KeyValueStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> String {
        format!("dataset:{}", self.name)
    }

    /// Append an example; returns it with the new total count
    ///
    /// # Errors
    /// Returns `InvalidInput` for an empty or non-finite feature vector or an
    /// empty label
    pub async fn create(&self, example: NewExample) -> Result<(TrainingExample, usize)> {
        if example.x.is_empty() {
            return Err(Error::InvalidInput("Feature vector is empty".to_string()));
        }
        if example.x.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(
                "Feature vector contains non-finite values".to_string(),
            ));
        }
        if example.y.trim().is_empty() {
            return Err(Error::InvalidInput("Label must not be empty".to_string()));
        }

        let record = TrainingExample {
            id: Uuid::new_v4(),
            x: example.x,
            y: example.y,
            thumbnail: example.thumbnail,
            created_at: Utc::now(),
        };

        let key = self.key();
        let saved = record.clone();
        let count = self
            .store
            .update(&key, move |current: Option<Vec<TrainingExample>>| {
                let mut examples = current.unwrap_or_default();
                examples.push(record);
                let count = examples.len();
                Ok((examples, count))
            })
            .await?;

        debug!(dataset = %self.name, label = %saved.y, count, "Saved training example");
        Ok((saved, count))
    }

    pub async fn list(&self) -> Result<Vec<TrainingExample>> {
        Ok(self
            .store
            .get::<Vec<TrainingExample>>(&self.key())
            .await?
            .unwrap_or_default())
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }

    /// Number of examples per label
    pub async fn label_counts(&self) -> Result<BTreeMap<String, usize>> {
        Ok(label_counts(&self.list().await?))
    }

    /// Delete every example; returns how many were removed
    pub async fn clear(&self) -> Result<usize> {
        let removed = self
            .store
            .take::<Vec<TrainingExample>>(&self.key())
            .await?
            .map_or(0, |examples| examples.len());
        info!(dataset = %self.name, removed, "Cleared dataset");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(label: &str) -> NewExample {
        NewExample {
            x: vec![0.1, 0.2, 0.3],
            y: label.to_string(),
            thumbnail: None,
        }
    }

    #[tokio::test]
    async fn test_in_memory_set_get_remove() {
        let store = KeyValueStore::in_memory();
        store.set("a", &42u32).await.unwrap();
        assert_eq!(store.get::<u32>("a").await.unwrap(), Some(42));
        assert!(store.remove("a").await.unwrap());
        assert!(!store.remove("a").await.unwrap());
        assert_eq!(store.get::<u32>("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dataset_create_counts() {
        let dataset = Dataset::new(TRAINING_DATASET, Arc::new(KeyValueStore::in_memory()));
        let (_, count) = dataset.create(example("Beer")).await.unwrap();
        assert_eq!(count, 1);
        let (saved, count) = dataset.create(example("Gin")).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(saved.y, "Gin");

        let counts = dataset.label_counts().await.unwrap();
        assert_eq!(counts.get("Beer"), Some(&1));
        assert_eq!(counts.get("Gin"), Some(&1));
    }

    #[tokio::test]
    async fn test_dataset_rejects_empty_features() {
        let dataset = Dataset::new(TRAINING_DATASET, Arc::new(KeyValueStore::in_memory()));
        let mut bad = example("Beer");
        bad.x.clear();
        assert!(matches!(
            dataset.create(bad).await,
            Err(Error::InvalidInput(_))
        ));

        let mut nan = example("Beer");
        nan.x.push(f32::NAN);
        assert!(dataset.create(nan).await.is_err());
        assert_eq!(dataset.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dataset_clear() {
        let dataset = Dataset::new(TRAINING_DATASET, Arc::new(KeyValueStore::in_memory()));
        dataset.create(example("Rum")).await.unwrap();
        dataset.create(example("Rum")).await.unwrap();
        assert_eq!(dataset.clear().await.unwrap(), 2);
        assert_eq!(dataset.count().await.unwrap(), 0);
        assert_eq!(dataset.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_take_removes_and_returns_value() {
        let store = KeyValueStore::in_memory();
        store.set("k", &vec![1u32, 2, 3]).await.unwrap();
        assert_eq!(store.take::<Vec<u32>>("k").await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.take::<Vec<u32>>("k").await.unwrap(), None);
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_counts_every_concurrently_saved_example() {
        let dataset = Dataset::new(TRAINING_DATASET, Arc::new(KeyValueStore::in_memory()));
        let writers: Vec<_> = (0..8)
            .map(|_| {
                let dataset = dataset.clone();
                tokio::spawn(async move { dataset.create(example("Sake")).await.unwrap() })
            })
            .collect();

        let mut removed = 0;
        for _ in 0..4 {
            removed += dataset.clear().await.unwrap();
            tokio::task::yield_now().await;
        }
        for writer in writers {
            writer.await.unwrap();
        }
        removed += dataset.clear().await.unwrap();

        assert_eq!(removed, 8);
    }

    #[test]
    fn test_label_counts_groups_by_label() {
        let at = Utc::now();
        let examples: Vec<TrainingExample> = ["Beer", "Gin", "Beer"]
            .iter()
            .map(|label| TrainingExample {
                id: Uuid::new_v4(),
                x: vec![1.0],
                y: label.to_string(),
                thumbnail: None,
                created_at: at,
            })
            .collect();

        let counts = label_counts(&examples);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["Beer"], 2);
        assert_eq!(counts["Gin"], 1);
    }
}
