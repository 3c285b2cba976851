use puzzle_core::error::StorageError;
use puzzle_core::store::KeyValueStore;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{DomException, Storage};

/// `window.localStorage` as a [`KeyValueStore`].
pub struct LocalStore {
    storage: Option<Storage>,
}

impl LocalStore {
    /// Private browsing modes may refuse `localStorage`; every operation then
    /// reports [`StorageError::Unavailable`] and play continues in memory.
    pub fn open() -> Self {
        let storage = web_sys::window().and_then(|w| w.local_storage().ok().flatten());
        if storage.is_none() {
            tracing::warn!("localStorage unavailable, progress will not be saved");
        }
        LocalStore { storage }
    }

    fn storage(&self) -> Result<&Storage, StorageError> {
        self.storage
            .as_ref()
            .ok_or_else(|| StorageError::unavailable("localStorage is not available"))
    }
}

fn classify(err: JsValue) -> StorageError {
    match err.dyn_ref::<DomException>() {
        Some(e) if e.name() == "QuotaExceededError" || e.code() == 22 => {
            StorageError::QuotaExceeded
        }
        Some(e) => StorageError::unavailable(e.message()),
        None => StorageError::unavailable(format!("{err:?}")),
    }
}

impl KeyValueStore for LocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.storage()?.get_item(key).map_err(classify)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage()?.set_item(key, value).map_err(classify)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.storage()?.remove_item(key).map_err(classify)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let storage = self.storage()?;
        let len = storage.length().map_err(classify)?;
        let mut out = Vec::with_capacity(len as usize);
        for i in 0..len {
            if let Some(k) = storage.key(i).map_err(classify)? {
                out.push(k);
            }
        }
        Ok(out)
    }
}
