use js_sys::{ArrayBuffer, Promise, Uint8Array};
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Event, File, FileReader};

use crate::utils::{js_error, png_data_url};

/// Reads a picked file into memory.
pub async fn read_file_bytes(file: &File) -> Result<Vec<u8>, JsValue> {
    let reader = FileReader::new()?;
    let reader_for_closure = reader.clone();
    let done = Promise::new(&mut |resolve, reject| {
        let reader = reader_for_closure.clone();
        let reject_on_error = reject.clone();
        let onload = Closure::once(move |_ev: Event| {
            let settled = match reader.result() {
                Ok(v) => resolve.call1(&JsValue::NULL, &v),
                Err(e) => reject.call1(&JsValue::NULL, &e),
            };
            if let Err(e) = settled {
                tracing::warn!(error = ?e, "could not resolve file read");
            }
        });
        let onerror = Closure::once(move |_ev: Event| {
            tracing::warn!("file read failed");
            if let Err(e) = reject_on_error.call1(&JsValue::NULL, &js_error("file could not be read")) {
                tracing::warn!(error = ?e, "could not reject file read");
            }
        });
        reader_for_closure.set_onload(Some(onload.as_ref().unchecked_ref()));
        reader_for_closure.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        onload.forget();
        onerror.forget();
    });
    reader.read_as_array_buffer(file)?;
    let buf: ArrayBuffer = JsFuture::from(done).await?.dyn_into()?;
    Ok(Uint8Array::new(&buf).to_vec())
}

/// Picked image file (PNG, JPEG, WebP or GIF) to a compressed PNG `data:`
/// URL for the editor.
pub async fn prepare_image(file: &File) -> Result<String, JsValue> {
    let bytes = read_file_bytes(file).await?;
    let png = puzzle_imaging::compress(&bytes, puzzle_imaging::DEFAULT_BUDGET)
        .map_err(|e| js_error(&format!("{}: {e}", file.name())))?;
    tracing::debug!(name = %file.name(), from = bytes.len(), to = png.len(), "image prepared");
    Ok(png_data_url(&png))
}
