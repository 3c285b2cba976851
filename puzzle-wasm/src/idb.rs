use std::cell::RefCell;

use async_trait::async_trait;
use js_sys::{Array, Promise};
use puzzle_core::error::StorageError;
use puzzle_core::store::LargeObjectStore;
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    DomException, Event, IdbDatabase, IdbObjectStore, IdbRequest, IdbTransaction,
    IdbTransactionMode, Window,
};

use crate::utils::js_error;

const DB_NAME: &str = "hidden-object-puzzles";
const DB_VERSION: u32 = 1;
const CUSTOM_PUZZLES: &str = "custom-puzzles";

/// IndexedDB object store holding custom puzzles. The database is opened on
/// first use.
pub struct IdbStore {
    window: Window,
    db: RefCell<Option<IdbDatabase>>,
}

fn classify(err: JsValue) -> StorageError {
    match err.dyn_ref::<DomException>() {
        Some(e) if e.name() == "QuotaExceededError" => StorageError::QuotaExceeded,
        Some(e) => StorageError::unavailable(e.message()),
        None => StorageError::unavailable(format!("{err:?}")),
    }
}

fn settle(resolve: &js_sys::Function, reject: &js_sys::Function, outcome: Result<JsValue, JsValue>) {
    let called = match outcome {
        Ok(v) => resolve.call1(&JsValue::NULL, &v),
        Err(e) => reject.call1(&JsValue::NULL, &e),
    };
    if let Err(e) = called {
        tracing::warn!(error = ?e, "could not settle IndexedDB promise");
    }
}

/// Resolves with the request's result once it succeeds.
async fn request_done(request: &IdbRequest) -> Result<JsValue, JsValue> {
    let done = Promise::new(&mut |resolve, reject| {
        let req = request.clone();
        let reject_on_error = reject.clone();
        let onsuccess = Closure::once(move |_ev: Event| settle(&resolve, &reject, req.result()));
        let req = request.clone();
        let onerror = Closure::once(move |_ev: Event| {
            let err = req
                .error()
                .ok()
                .flatten()
                .map(JsValue::from)
                .unwrap_or_else(|| js_error("IndexedDB request failed"));
            settle(&reject_on_error, &reject_on_error, Err(err));
        });
        request.set_onsuccess(Some(onsuccess.as_ref().unchecked_ref()));
        request.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        onsuccess.forget();
        onerror.forget();
    });
    JsFuture::from(done).await
}

/// Resolves once a write transaction has committed.
async fn transaction_done(tx: &IdbTransaction) -> Result<(), JsValue> {
    let done = Promise::new(&mut |resolve, reject| {
        let reject_on_abort = reject.clone();
        let oncomplete =
            Closure::once(move |_ev: Event| settle(&resolve, &reject, Ok(JsValue::UNDEFINED)));
        let t = tx.clone();
        let onabort = Closure::once(move |_ev: Event| {
            let err = t
                .error()
                .map(JsValue::from)
                .unwrap_or_else(|| js_error("IndexedDB transaction aborted"));
            settle(&reject_on_abort, &reject_on_abort, Err(err));
        });
        tx.set_oncomplete(Some(oncomplete.as_ref().unchecked_ref()));
        tx.set_onabort(Some(onabort.as_ref().unchecked_ref()));
        oncomplete.forget();
        onabort.forget();
    });
    JsFuture::from(done).await.map(|_| ())
}

impl IdbStore {
    pub fn new(window: Window) -> Self {
        IdbStore {
            window,
            db: RefCell::new(None),
        }
    }

    async fn database(&self) -> Result<IdbDatabase, StorageError> {
        if let Some(db) = self.db.borrow().as_ref() {
            return Ok(db.clone());
        }
        let factory = self
            .window
            .indexed_db()
            .map_err(classify)?
            .ok_or_else(|| StorageError::unavailable("IndexedDB is not available"))?;
        let open = factory
            .open_with_u32(DB_NAME, DB_VERSION)
            .map_err(classify)?;
        let upgrading = open.clone();
        let onupgradeneeded = Closure::once(move |_ev: Event| {
            let created = upgrading
                .result()
                .and_then(|db| db.dyn_into::<IdbDatabase>().map_err(JsValue::from))
                .and_then(|db| {
                    if db.object_store_names().contains(CUSTOM_PUZZLES) {
                        Ok(())
                    } else {
                        db.create_object_store(CUSTOM_PUZZLES).map(|_| ())
                    }
                });
            if let Err(e) = created {
                tracing::warn!(error = ?e, "could not create the custom puzzle store");
            }
        });
        open.set_onupgradeneeded(Some(onupgradeneeded.as_ref().unchecked_ref()));
        onupgradeneeded.forget();

        let db: IdbDatabase = request_done(&open)
            .await
            .and_then(|v| v.dyn_into().map_err(JsValue::from))
            .map_err(classify)?;
        tracing::debug!(name = DB_NAME, "IndexedDB opened");
        self.db.replace(Some(db.clone()));
        Ok(db)
    }

    async fn objects(
        &self,
        mode: IdbTransactionMode,
    ) -> Result<(IdbTransaction, IdbObjectStore), StorageError> {
        let db = self.database().await?;
        let tx = db
            .transaction_with_str_and_mode(CUSTOM_PUZZLES, mode)
            .map_err(classify)?;
        let store = tx.object_store(CUSTOM_PUZZLES).map_err(classify)?;
        Ok((tx, store))
    }
}

#[async_trait(?Send)]
impl LargeObjectStore for IdbStore {
    async fn read_object(&self, key: &str) -> Result<Option<String>, StorageError> {
        let (_tx, store) = self.objects(IdbTransactionMode::Readonly).await?;
        let request = store.get(&JsValue::from_str(key)).map_err(classify)?;
        let value = request_done(&request).await.map_err(classify)?;
        Ok(value.as_string())
    }

    async fn write_object(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let (tx, store) = self.objects(IdbTransactionMode::Readwrite).await?;
        store
            .put_with_key(&JsValue::from_str(value), &JsValue::from_str(key))
            .map_err(classify)?;
        transaction_done(&tx).await.map_err(classify)
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let (tx, store) = self.objects(IdbTransactionMode::Readwrite).await?;
        store.delete(&JsValue::from_str(key)).map_err(classify)?;
        transaction_done(&tx).await.map_err(classify)
    }

    async fn object_keys(&self) -> Result<Vec<String>, StorageError> {
        let (_tx, store) = self.objects(IdbTransactionMode::Readonly).await?;
        let request = store.get_all_keys().map_err(classify)?;
        let keys: Array = request_done(&request)
            .await
            .and_then(|v| v.dyn_into().map_err(JsValue::from))
            .map_err(classify)?;
        Ok(keys.iter().filter_map(|k| k.as_string()).collect())
    }
}
