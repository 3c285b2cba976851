//! Browser runtime for the hidden-object game.
//!
//! The host page owns the DOM: it draws the image, markers and hint circle
//! from the views returned here and forwards pointer events in container
//! pixel coordinates.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;
use gloo_timers::callback::Timeout;
use js_sys::{Function, Promise};
use puzzle_core::constants::HINT_DURATION_MS;
use puzzle_core::error::{PuzzleError, RemoteError, StorageError};
use puzzle_core::locale::{Language, Message, describe_progress};
use puzzle_core::mapping::{Rect, Viewport};
use puzzle_core::models::{Point, PositionKey, Puzzle};
use puzzle_core::progress::{FindPhase, MarkOutcome};
use puzzle_core::remote::{Publisher, RepoConfig};
use puzzle_core::store::{CredentialStore, KvCredentialStore, SettingsStore};
use puzzle_core::{Hint, marker_color};
use serde::Serialize;
use tracing::{debug, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

mod editor;
mod idb;
mod net;
mod state;
mod storage;
mod upload;
mod utils;

pub use editor::Editor;

use crate::net::GithubRepository;
use crate::state::{STATE, Session, session, with_session};
use crate::utils::{
    decode_data_url, fetch_bytes, get_query_param, js_error, png_data_url, save_text_as_file,
    to_js,
};

/// Localised notice for an error the player should see.
fn notice(e: &PuzzleError) -> Option<Message> {
    Some(match e {
        PuzzleError::Storage(StorageError::QuotaExceeded) => Message::StorageFull,
        PuzzleError::Storage(_) => Message::StorageUnavailable,
        PuzzleError::NotFound { .. } => Message::PuzzleNotFound,
        PuzzleError::Remote(RemoteError::MissingCredential) => Message::CredentialRequired,
        PuzzleError::Remote(RemoteError::Unauthorized(_)) => Message::CredentialRejected,
        PuzzleError::Remote(_) => Message::UploadFailed,
        _ => return None,
    })
}

fn describe(e: &PuzzleError, lang: Language) -> String {
    match notice(e) {
        Some(m) => format!("{} ({e})", m.text(lang)),
        None => e.to_string(),
    }
}

fn fail(e: PuzzleError, lang: Language) -> JsValue {
    js_error(&describe(&e, lang))
}

fn current_language() -> Language {
    with_session(|s| s.settings.language).unwrap_or_default()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetView {
    title: String,
    color: &'static str,
    found: usize,
    total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PuzzleView {
    id: String,
    name: String,
    image_src: String,
    found: usize,
    total: usize,
    completed: bool,
    targets: Vec<TargetView>,
    /// Set when progress could not be restored or saved.
    warning: Option<String>,
}

fn puzzle_view(s: &Session, warning: Option<String>) -> Option<PuzzleView> {
    let puzzle = s.finder.puzzle()?;
    let found = s.finder.found()?;
    let (found_total, total) = s.finder.counts();
    let targets = puzzle
        .targets
        .iter()
        .enumerate()
        .map(|(i, t)| TargetView {
            title: t.title.clone(),
            color: marker_color(i),
            found: (0..t.positions.len())
                .filter(|idx| found.contains(&PositionKey::new(&t.title, *idx)))
                .count(),
            total: t.positions.len(),
        })
        .collect();
    Some(PuzzleView {
        id: puzzle.id.clone(),
        name: puzzle.name.clone(),
        image_src: puzzle.image_src.clone(),
        found: found_total,
        total,
        completed: s.finder.is_completed(),
        targets,
        warning,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TapView {
    /// `found`, `already`, `miss`, `outside` or `idle`.
    outcome: &'static str,
    key: Option<String>,
    completed: bool,
    message: Option<&'static str>,
    warning: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkerView {
    key: String,
    title: String,
    color: &'static str,
    x: f64,
    y: f64,
    radius: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HintView {
    key: String,
    level: u32,
    x: f64,
    y: f64,
    radius: f64,
    generation: u64,
}

fn hint_view(viewport: &Viewport, hint: &Hint) -> Option<HintView> {
    let c = viewport.to_pixel_space(hint.target_center, Some(hint.center_offset))?;
    Some(HintView {
        key: hint.key.to_string(),
        level: hint.level,
        x: c.x,
        y: c.y,
        radius: viewport.puzzle_len_to_pixels(hint.radius)?,
        generation: hint.generation,
    })
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
    let window = web_sys::window().ok_or("no window")?;

    let deep_link = window
        .location()
        .search()
        .ok()
        .and_then(|search| get_query_param(&search, "p"));

    let session = Rc::new(RefCell::new(Session::new(window)));
    STATE.with(|st| st.replace(Some(session)));
    info!("puzzle runtime started");

    if let Some(id) = deep_link {
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = open_puzzle(&id).await {
                warn!(id = %id, error = ?e, "deep-linked puzzle failed to load");
            }
        });
    }
    Ok(())
}

async fn open_puzzle(id: &str) -> Result<JsValue, JsValue> {
    let library = with_session(|s| s.library.clone())?;
    let lang = current_language();
    let puzzle = library.get_puzzle(id).await.map_err(|e| fail(e, lang))?;
    with_session(|s| load_into(s, puzzle))?
}

fn load_into(s: &mut Session, puzzle: Puzzle) -> Result<JsValue, JsValue> {
    s.clear_hint();
    s.thumbnails.clear();
    s.viewport.reset_view();
    s.viewport.set_image_size(0.0, 0.0);
    let lang = s.settings.language;
    let warning = s.finder.load(puzzle).err().map(|e| describe(&e, lang));
    match puzzle_view(s, warning) {
        Some(view) => to_js(&view),
        None => Err(js_error("puzzle did not load")),
    }
}

/// Hosted and custom puzzles, as summaries.
#[wasm_bindgen]
pub fn list_puzzles() -> Result<Promise, JsValue> {
    let library = with_session(|s| s.library.clone())?;
    let lang = current_language();
    Ok(future_to_promise(async move {
        let list = library.list_puzzles().await.map_err(|e| fail(e, lang))?;
        to_js(&list)
    }))
}

/// Loads a puzzle and restores its progress. Resolves to the puzzle view.
#[wasm_bindgen]
pub fn load_puzzle(id: String) -> Promise {
    future_to_promise(async move { open_puzzle(&id).await })
}

#[wasm_bindgen]
pub fn current_puzzle() -> Result<JsValue, JsValue> {
    with_session(|s| match puzzle_view(s, None) {
        Some(view) => to_js(&view),
        None => Ok(JsValue::NULL),
    })?
}

#[wasm_bindgen]
pub fn set_container(left: f64, top: f64, width: f64, height: f64) -> Result<(), JsValue> {
    with_session(|s| {
        s.viewport
            .set_container(Rect::new(left, top, width, height))
    })
}

/// Natural size of the loaded image, once the host has it.
#[wasm_bindgen]
pub fn set_image_size(natural_w: f64, natural_h: f64) -> Result<(), JsValue> {
    with_session(|s| s.viewport.set_image_size(natural_w, natural_h))
}

#[wasm_bindgen]
pub fn zoom_at(factor: f64, x: f64, y: f64) -> Result<(), JsValue> {
    with_session(|s| s.viewport.zoom_at(factor, Point::new(x, y)))
}

#[wasm_bindgen]
pub fn pan_by(dx: f64, dy: f64) -> Result<(), JsValue> {
    with_session(|s| s.viewport.pan_by(dx, dy))
}

#[wasm_bindgen]
pub fn reset_view() -> Result<(), JsValue> {
    with_session(|s| s.viewport.reset_view())
}

/// Where the image is drawn, or `null` before layout is known.
#[wasm_bindgen]
pub fn image_rect() -> Result<JsValue, JsValue> {
    with_session(|s| match s.viewport.image_rect() {
        Some(r) => to_js(&r),
        None => Ok(JsValue::NULL),
    })?
}

/// Handles a tap at container pixel coordinates.
#[wasm_bindgen]
pub fn tap(x: f64, y: f64) -> Result<JsValue, JsValue> {
    with_session(|s| to_js(&tap_at(s, Point::new(x, y))))?
}

fn tap_at(s: &mut Session, at: Point) -> TapView {
    let lang = s.settings.language;
    let mut view = TapView {
        outcome: "idle",
        key: None,
        completed: s.finder.is_completed(),
        message: None,
        warning: None,
    };
    if s.finder.phase() != FindPhase::Playing {
        return view;
    }
    let Some(p) = s.viewport.to_puzzle_space(at.x, at.y) else {
        view.outcome = "outside";
        return view;
    };
    let Some(key) = s.finder.check_hit(p) else {
        view.outcome = "miss";
        view.message = Some(Message::Miss.text(lang));
        return view;
    };
    let outcome = match s.finder.mark_found(&key) {
        Ok(outcome) => outcome,
        Err(e) => {
            // The find is kept in memory even when it could not be saved.
            view.warning = Some(describe(&e, lang));
            MarkOutcome::Found {
                completed: s.finder.is_completed(),
            }
        }
    };
    match outcome {
        MarkOutcome::Found { completed } => {
            s.hints.on_found(&key, completed);
            if completed || !s.hints.is_showing() {
                s.hint_timer = None;
            }
            view.outcome = "found";
            view.completed = completed;
            view.message = Some(if completed {
                Message::PuzzleComplete.text(lang)
            } else {
                Message::Found.text(lang)
            });
        }
        MarkOutcome::AlreadyFound => {
            view.outcome = "already";
            view.message = Some(Message::AlreadyFound.text(lang));
        }
    }
    view.key = Some(key.to_string());
    view
}

/// Found positions in pixel space.
#[wasm_bindgen]
pub fn markers() -> Result<JsValue, JsValue> {
    with_session(|s| {
        let mut out = Vec::new();
        if let (Some(puzzle), Some(found)) = (s.finder.puzzle(), s.finder.found()) {
            for (i, target) in puzzle.targets.iter().enumerate() {
                for (idx, position) in target.positions.iter().enumerate() {
                    let key = PositionKey::new(&target.title, idx);
                    if !found.contains(&key) {
                        continue;
                    }
                    let (Some(c), Some(radius)) = (
                        s.viewport.to_pixel_space(position.center(), None),
                        s.viewport.puzzle_len_to_pixels(position.extent_radius()),
                    ) else {
                        continue;
                    };
                    out.push(MarkerView {
                        key: key.to_string(),
                        title: target.title.clone(),
                        color: marker_color(i),
                        x: c.x,
                        y: c.y,
                        radius,
                    });
                }
            }
        }
        to_js(&out)
    })?
}

/// Shows the next hint. `on_expire` runs when this hint times out (not when a
/// newer hint replaces it). Returns `null` when nothing is left to hint.
#[wasm_bindgen]
pub fn request_hint(on_expire: Option<Function>) -> Result<JsValue, JsValue> {
    with_session(|s| {
        let hint = match (s.finder.puzzle(), s.finder.found()) {
            (Some(puzzle), Some(found)) => s.hints.request(puzzle, found),
            _ => None,
        };
        let Some(hint) = hint else {
            debug!("no hint available");
            return Ok(JsValue::NULL);
        };
        let generation = hint.generation;
        // Replacing the handle cancels the previous hint's timer.
        s.hint_timer = Some(Timeout::new(HINT_DURATION_MS, move || {
            let expired = with_session(|s| s.hints.expire(generation)).unwrap_or(false);
            if expired
                && let Some(cb) = &on_expire
                && let Err(e) = cb.call0(&JsValue::NULL)
            {
                warn!(error = ?e, "hint expiry callback failed");
            }
        }));
        match hint_view(&s.viewport, &hint) {
            Some(view) => to_js(&view),
            None => Ok(JsValue::NULL),
        }
    })?
}

/// The hint on screen re-projected for the current layout, or `null`.
#[wasm_bindgen]
pub fn visible_hint() -> Result<JsValue, JsValue> {
    with_session(|s| match s.hints.visible_hint().and_then(|h| hint_view(&s.viewport, h)) {
        Some(view) => to_js(&view),
        None => Ok(JsValue::NULL),
    })?
}

/// Forgets every find of the current puzzle.
#[wasm_bindgen]
pub fn reset_progress() -> Result<(), JsValue> {
    with_session(|s| {
        s.clear_hint();
        let lang = s.settings.language;
        s.finder.reset().map_err(|e| fail(e, lang))
    })?
}

/// Progress as plain text, for text mode and screen readers.
#[wasm_bindgen]
pub fn text_summary() -> Result<String, JsValue> {
    with_session(|s| match (s.finder.puzzle(), s.finder.found()) {
        (Some(puzzle), Some(found)) => describe_progress(puzzle, found, s.settings.language),
        _ => String::new(),
    })
}

/// PNG thumbnail (`data:` URL) around the first position of a target.
#[wasm_bindgen]
pub fn thumbnail(title: String) -> Result<Promise, JsValue> {
    let session = session()?;
    let (window, image_src, center) = {
        let s = session.borrow();
        let puzzle = s.finder.puzzle().ok_or_else(|| js_error("no puzzle loaded"))?;
        let target = puzzle
            .target(&title)
            .ok_or_else(|| js_error(&format!("unknown target {title:?}")))?;
        let position = target
            .positions
            .first()
            .ok_or_else(|| js_error(&format!("target {title:?} has no positions")))?;
        if let Some(cached) = s.thumbnails.get(&puzzle.image_src, &title) {
            let cached = JsValue::from_str(cached);
            return Ok(Promise::resolve(&cached));
        }
        (s.window.clone(), puzzle.image_src.clone(), position.center())
    };
    Ok(future_to_promise(async move {
        let bytes = fetch_bytes(&window, &image_src).await?;
        let png = puzzle_imaging::thumbnail(&bytes, center).map_err(|e| js_error(&e.to_string()))?;
        let url = png_data_url(&png);
        session
            .borrow_mut()
            .thumbnails
            .insert(&image_src, &title, url.clone());
        Ok(JsValue::from_str(&url))
    }))
}

#[wasm_bindgen]
pub fn settings() -> Result<JsValue, JsValue> {
    with_session(|s| to_js(&s.settings))?
}

fn save_settings(s: &Session) -> Result<(), JsValue> {
    SettingsStore::new(s.kv.clone())
        .save(&s.settings)
        .map_err(|e| fail(e.into(), s.settings.language))
}

#[wasm_bindgen]
pub fn set_language(tag: &str) -> Result<(), JsValue> {
    with_session(|s| {
        s.settings.language = Language::parse(tag);
        save_settings(s)
    })?
}

#[wasm_bindgen]
pub fn set_text_mode(on: bool) -> Result<(), JsValue> {
    with_session(|s| {
        s.settings.text_mode = on;
        save_settings(s)
    })?
}

/// Picked image file to a compressed PNG `data:` URL.
#[wasm_bindgen]
pub fn prepare_image(file: web_sys::File) -> Promise {
    future_to_promise(async move {
        let url = upload::prepare_image(&file).await?;
        Ok(JsValue::from_str(&url))
    })
}

/// Saves the editor's draft as a custom puzzle. Resolves to its id.
#[wasm_bindgen]
pub fn save_custom(editor: &Editor) -> Result<Promise, JsValue> {
    let library = with_session(|s| s.library.clone())?;
    let lang = current_language();
    let custom = editor.finish(Utc::now()).map_err(|e| fail(e, lang))?;
    Ok(future_to_promise(async move {
        library.save_custom(&custom).await.map_err(|e| fail(e, lang))?;
        info!(id = %custom.puzzle.id, "custom puzzle saved");
        Ok(JsValue::from_str(&custom.puzzle.id))
    }))
}

/// Reopens a custom puzzle. Resolves to a new editor.
#[wasm_bindgen]
pub fn edit_custom(id: String) -> Result<Promise, JsValue> {
    let library = with_session(|s| s.library.clone())?;
    let lang = current_language();
    Ok(future_to_promise(async move {
        let custom = library.get_custom(&id).await.map_err(|e| fail(e, lang))?;
        Ok(Editor::from_custom(&custom).into())
    }))
}

#[wasm_bindgen]
pub fn delete_custom(id: String) -> Result<Promise, JsValue> {
    let library = with_session(|s| {
        if s.finder.puzzle().is_some_and(|p| p.id == id) {
            s.clear_hint();
            s.finder.unload();
        }
        s.library.clone()
    })?;
    let lang = current_language();
    Ok(future_to_promise(async move {
        library.delete_custom(&id).await.map_err(|e| fail(e, lang))?;
        Ok(JsValue::UNDEFINED)
    }))
}

/// Downloads a custom puzzle's manifest (without its image) as JSON.
#[wasm_bindgen]
pub fn export_custom(id: String) -> Result<Promise, JsValue> {
    let (library, window) = with_session(|s| (s.library.clone(), s.window.clone()))?;
    let lang = current_language();
    Ok(future_to_promise(async move {
        let custom = library.get_custom(&id).await.map_err(|e| fail(e, lang))?;
        let json = serde_json::to_string_pretty(&custom.puzzle)
            .map_err(|e| js_error(&e.to_string()))?;
        let document = window.document().ok_or("no document")?;
        save_text_as_file(&document, &format!("{id}.json"), &json)?;
        Ok(JsValue::UNDEFINED)
    }))
}

/// Stores where published puzzles go.
#[wasm_bindgen]
pub fn configure_repository(owner: &str, repo: &str, branch: Option<String>) -> Result<(), JsValue> {
    with_session(|s| {
        let lang = s.settings.language;
        RepoConfig::new(owner, repo, branch.as_deref())
            .and_then(|cfg| cfg.save(&s.kv))
            .map_err(|e| fail(e, lang))
    })?
}

#[wasm_bindgen]
pub fn set_token(token: &str) -> Result<(), JsValue> {
    with_session(|s| {
        KvCredentialStore::new(s.kv.clone())
            .set_token(token)
            .map_err(|e| fail(e.into(), s.settings.language))
    })?
}

#[wasm_bindgen]
pub fn has_token() -> Result<bool, JsValue> {
    with_session(|s| KvCredentialStore::new(s.kv.clone()).token().is_some())
}

type GithubPublisher = Publisher<GithubRepository, KvCredentialStore<state::Kv>>;

fn publisher(s: &Session) -> Result<GithubPublisher, PuzzleError> {
    let config = RepoConfig::load(&s.kv)?
        .ok_or_else(|| PuzzleError::invalid("no repository configured"))?;
    Ok(Publisher::new(
        GithubRepository::new(s.window.clone(), config),
        KvCredentialStore::new(s.kv.clone()),
    ))
}

/// Uploads a custom puzzle. Resolves to the manifest URL, if the service
/// returned one.
#[wasm_bindgen]
pub fn publish_custom(id: String) -> Result<Promise, JsValue> {
    let (publisher, library, lang) = with_session(|s| {
        let lang = s.settings.language;
        let publisher = publisher(s).map_err(|e| fail(e, lang))?;
        Ok::<_, JsValue>((publisher, s.library.clone(), lang))
    })??;
    Ok(future_to_promise(async move {
        let custom = library.get_custom(&id).await.map_err(|e| fail(e, lang))?;
        let png = decode_data_url(&custom.image_data)
            .ok_or_else(|| js_error("custom puzzle image is not an embedded PNG"))?;
        let receipt = publisher
            .publish(&custom, &png)
            .await
            .map_err(|e| fail(e, lang))?;
        info!(id = %custom.puzzle.id, "published");
        Ok(receipt.url.map_or(JsValue::NULL, |u| JsValue::from_str(&u)))
    }))
}

#[wasm_bindgen]
pub fn unpublish(id: String) -> Result<Promise, JsValue> {
    let (publisher, lang) = with_session(|s| {
        let lang = s.settings.language;
        publisher(s).map(|p| (p, lang)).map_err(|e| fail(e, lang))
    })??;
    Ok(future_to_promise(async move {
        publisher.unpublish(&id).await.map_err(|e| fail(e, lang))?;
        Ok(JsValue::UNDEFINED)
    }))
}

/// User-facing text for a message id such as `"found"`, in the current language.
#[wasm_bindgen]
pub fn message(id: &str) -> Result<String, JsValue> {
    let m = match id {
        "found" => Message::Found,
        "already" => Message::AlreadyFound,
        "miss" => Message::Miss,
        "complete" => Message::PuzzleComplete,
        "all-found" => Message::AllFound,
        "uploaded" => Message::Uploaded,
        other => return Err(js_error(&format!("unknown message {other:?}"))),
    };
    Ok(m.text(current_language()).to_string())
}
