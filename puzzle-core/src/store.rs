//! Local persistence.
//!
//! Two tiers. Small records (progress, settings, credentials) sit in a
//! synchronous string key-value store ([`KeyValueStore`]), which the browser
//! backs with `localStorage`. Custom puzzles embed their image and go to a
//! separate asynchronous [`LargeObjectStore`] (IndexedDB in the browser) that
//! must hold at least tens of megabytes. Tests use [`MemoryStore`] for both;
//! it can simulate a storage quota.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::StorageError;
use crate::models::{CustomPuzzle, Progress, Settings};

pub const PROGRESS_PREFIX: &str = "progress:";
pub const SETTINGS_KEY: &str = "settings";
pub const TOKEN_KEY: &str = "repo-token";
pub const REPO_CONFIG_KEY: &str = "repo-config";

/// Minimal string store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).keys()
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).keys()
    }
}

/// In-memory store. With a quota, writes that would push the total size of
/// keys and values past it fail with [`StorageError::QuotaExceeded`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(bytes: usize) -> Self {
        MemoryStore {
            entries: RefCell::default(),
            quota: Some(bytes),
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            let replaced = self
                .entries
                .borrow()
                .get(key)
                .map_or(0, |old| key.len() + old.len());
            if self.used_bytes() - replaced + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.borrow().keys().cloned().collect())
    }
}

/// Asynchronous store for large string records, keyed by id.
#[async_trait(?Send)]
pub trait LargeObjectStore {
    async fn read_object(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn write_object(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
    async fn object_keys(&self) -> Result<Vec<String>, StorageError>;
}

#[async_trait(?Send)]
impl<T: LargeObjectStore + ?Sized> LargeObjectStore for Rc<T> {
    async fn read_object(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read_object(key).await
    }
    async fn write_object(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).write_object(key, value).await
    }
    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete_object(key).await
    }
    async fn object_keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).object_keys().await
    }
}

#[async_trait(?Send)]
impl LargeObjectStore for MemoryStore {
    async fn read_object(&self, key: &str) -> Result<Option<String>, StorageError> {
        KeyValueStore::get(self, key)
    }
    async fn write_object(&self, key: &str, value: &str) -> Result<(), StorageError> {
        KeyValueStore::set(self, key, value)
    }
    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        KeyValueStore::remove(self, key)
    }
    async fn object_keys(&self) -> Result<Vec<String>, StorageError> {
        KeyValueStore::keys(self)
    }
}

pub fn get_json<T: DeserializeOwned>(
    kv: &impl KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match kv.get(key)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| StorageError::corrupt(key, e)),
        None => Ok(None),
    }
}

pub fn set_json<T: Serialize>(
    kv: &impl KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let text = serde_json::to_string(value).map_err(|e| StorageError::corrupt(key, e))?;
    kv.set(key, &text)
}

/// Where play progress is kept.
#[cfg_attr(test, mockall::automock)]
pub trait ProgressStore {
    fn load(&self, puzzle_id: &str) -> Result<Option<Progress>, StorageError>;
    fn save(&self, progress: &Progress) -> Result<(), StorageError>;
    fn delete(&self, puzzle_id: &str) -> Result<(), StorageError>;
}

/// Progress records under `progress:<puzzle id>`.
#[derive(Clone, Debug)]
pub struct KvProgressStore<K> {
    kv: K,
}

impl<K: KeyValueStore> KvProgressStore<K> {
    pub fn new(kv: K) -> Self {
        KvProgressStore { kv }
    }
}

impl<K: KeyValueStore> ProgressStore for KvProgressStore<K> {
    fn load(&self, puzzle_id: &str) -> Result<Option<Progress>, StorageError> {
        get_json(&self.kv, &format!("{PROGRESS_PREFIX}{puzzle_id}"))
    }

    fn save(&self, progress: &Progress) -> Result<(), StorageError> {
        set_json(
            &self.kv,
            &format!("{PROGRESS_PREFIX}{}", progress.puzzle_id),
            progress,
        )
    }

    fn delete(&self, puzzle_id: &str) -> Result<(), StorageError> {
        self.kv.remove(&format!("{PROGRESS_PREFIX}{puzzle_id}"))
    }
}

/// User settings under a single key.
#[derive(Clone, Debug)]
pub struct SettingsStore<K> {
    kv: K,
}

impl<K: KeyValueStore> SettingsStore<K> {
    pub fn new(kv: K) -> Self {
        SettingsStore { kv }
    }

    /// Stored settings, or defaults when missing or unreadable.
    pub fn load(&self) -> Settings {
        match get_json(&self.kv, SETTINGS_KEY) {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "falling back to default settings");
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        set_json(&self.kv, SETTINGS_KEY, settings)
    }
}

/// Editor-made puzzles in the large-object tier, one record per puzzle id.
#[derive(Clone, Debug)]
pub struct CustomPuzzleStore<B> {
    objects: B,
}

impl<B: LargeObjectStore> CustomPuzzleStore<B> {
    pub fn new(objects: B) -> Self {
        CustomPuzzleStore { objects }
    }

    /// All readable custom puzzles, oldest first. Corrupt records are skipped.
    pub async fn list(&self) -> Result<Vec<CustomPuzzle>, StorageError> {
        let mut out = Vec::new();
        for key in self.objects.object_keys().await? {
            match self.get(&key).await {
                Ok(Some(p)) => out.push(p),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "skipping unreadable custom puzzle"),
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    pub async fn get(&self, id: &str) -> Result<Option<CustomPuzzle>, StorageError> {
        match self.objects.read_object(id).await? {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StorageError::corrupt(id, e)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, puzzle: &CustomPuzzle) -> Result<(), StorageError> {
        let id = &puzzle.puzzle.id;
        let text = serde_json::to_string(puzzle).map_err(|e| StorageError::corrupt(id, e))?;
        self.objects.write_object(id, &text).await
    }

    /// Returns whether a record existed.
    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let existed = self.objects.read_object(id).await?.is_some();
        if existed {
            self.objects.delete_object(id).await?;
        }
        Ok(existed)
    }
}

/// Bearer credential for the content repository.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: &str) -> Result<(), StorageError>;
    fn clear_token(&self);
}

#[derive(Clone, Debug)]
pub struct KvCredentialStore<K> {
    kv: K,
}

impl<K: KeyValueStore> KvCredentialStore<K> {
    pub fn new(kv: K) -> Self {
        KvCredentialStore { kv }
    }
}

impl<K: KeyValueStore> CredentialStore for KvCredentialStore<K> {
    fn token(&self) -> Option<String> {
        self.kv
            .get(TOKEN_KEY)
            .ok()
            .flatten()
            .filter(|t| !t.trim().is_empty())
    }

    fn set_token(&self, token: &str) -> Result<(), StorageError> {
        self.kv.set(TOKEN_KEY, token.trim())
    }

    fn clear_token(&self) {
        if let Err(e) = self.kv.remove(TOKEN_KEY) {
            warn!(error = %e, "could not clear repository token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Language;
    use crate::models::{PositionKey, Puzzle};
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn custom(id: &str, created: i64) -> CustomPuzzle {
        CustomPuzzle {
            puzzle: Puzzle {
                id: id.into(),
                name: id.to_uppercase(),
                image_src: String::new(),
                targets: vec![],
            },
            image_data: "data:image/png;base64,AAAA".into(),
            created_at: at(created),
        }
    }

    #[test]
    fn progress_round_trips_through_the_store() {
        let store = KvProgressStore::new(MemoryStore::new());
        assert_eq!(store.load("zoo").unwrap(), None);
        let progress = Progress {
            puzzle_id: "zoo".into(),
            found_positions: vec![PositionKey::new("zebra", 1)],
            completed: false,
            last_played: at(1_700_000_000),
        };
        store.save(&progress).unwrap();
        assert_eq!(store.load("zoo").unwrap(), Some(progress));
        store.delete("zoo").unwrap();
        assert_eq!(store.load("zoo").unwrap(), None);
    }

    #[test]
    fn corrupt_progress_is_reported() {
        let kv = MemoryStore::new();
        kv.set("progress:zoo", "{not json").unwrap();
        let err = KvProgressStore::new(&kv).load("zoo").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { ref key, .. } if key == "progress:zoo"));
    }

    #[test]
    fn quota_rejects_oversized_writes_but_allows_replacing() {
        let kv = MemoryStore::with_quota(20);
        kv.set("a", "0123456789").unwrap();
        assert_eq!(kv.set("b", "0123456789"), Err(StorageError::QuotaExceeded));
        // replacing an entry only counts the difference
        kv.set("a", "0123456789abcdefgh").unwrap();
        assert_eq!(kv.get("b").unwrap(), None);
    }

    #[test]
    fn settings_default_when_missing_or_corrupt() {
        let kv = MemoryStore::new();
        let settings = SettingsStore::new(&kv);
        assert_eq!(settings.load(), Settings::default());
        kv.set(SETTINGS_KEY, "{oops").unwrap();
        assert_eq!(settings.load(), Settings::default());
        let zh = Settings {
            language: Language::Zh,
            text_mode: true,
        };
        settings.save(&zh).unwrap();
        assert_eq!(settings.load(), zh);
    }

    #[tokio::test]
    async fn custom_puzzles_list_oldest_first_and_skip_corrupt_records() {
        let objects = MemoryStore::new();
        let store = CustomPuzzleStore::new(Rc::new(objects));
        store.save(&custom("b", 20)).await.unwrap();
        store.save(&custom("a", 10)).await.unwrap();
        store.objects.write_object("broken", "nope").await.unwrap();

        let ids: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.puzzle.id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn custom_puzzles_do_not_touch_the_small_record_store() {
        let kv = Rc::new(MemoryStore::with_quota(256));
        let objects = Rc::new(MemoryStore::new());
        let store = CustomPuzzleStore::new(objects.clone());
        let mut big = custom("big", 1);
        big.image_data = format!("data:image/png;base64,{}", "A".repeat(200_000));
        store.save(&big).await.unwrap();
        assert_eq!(kv.used_bytes(), 0);
        assert!(objects.used_bytes() > 200_000);
        SettingsStore::new(kv.clone()).save(&Settings::default()).unwrap();
    }

    #[test]
    fn blank_tokens_count_as_missing() {
        let kv = MemoryStore::new();
        let creds = KvCredentialStore::new(&kv);
        assert_eq!(creds.token(), None);
        creds.set_token("  ghp_abc \n").unwrap();
        assert_eq!(creds.token().as_deref(), Some("ghp_abc"));
        creds.clear_token();
        assert_eq!(creds.token(), None);
        kv.set(TOKEN_KEY, "   ").unwrap();
        assert_eq!(creds.token(), None);
    }
}
