use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::callback::Timeout;
use puzzle_core::catalog::PuzzleLibrary;
use puzzle_core::hint::HintEngine;
use puzzle_core::mapping::Viewport;
use puzzle_core::models::Settings;
use puzzle_core::progress::FindMachine;
use puzzle_core::store::{KvProgressStore, SettingsStore};
use puzzle_core::thumbnail::ThumbnailCache;
use rand::SeedableRng;
use rand::rngs::StdRng;
use wasm_bindgen::JsValue;
use web_sys::Window;

use crate::idb::IdbStore;
use crate::net::StaticCatalog;
use crate::storage::LocalStore;
use crate::utils::js_error;

pub type Kv = Rc<LocalStore>;
pub type Library = PuzzleLibrary<StaticCatalog, Kv, IdbStore>;

/// Runtime state shared by every exported function.
pub struct Session {
    pub window: Window,
    pub kv: Kv,
    /// Shared so async exports can hold it across `await` without a borrow.
    pub library: Rc<Library>,
    pub finder: FindMachine<KvProgressStore<Kv>>,
    pub hints: HintEngine<StdRng>,
    /// Dropping the handle cancels the pending expiry.
    pub hint_timer: Option<Timeout>,
    pub viewport: Viewport,
    pub settings: Settings,
    /// Thumbnail `data:` URLs.
    pub thumbnails: ThumbnailCache<String>,
}

impl Session {
    pub fn new(window: Window) -> Self {
        let kv = Rc::new(LocalStore::open());
        let settings = SettingsStore::new(kv.clone()).load();
        Session {
            library: Rc::new(PuzzleLibrary::new(
                StaticCatalog::new(window.clone()),
                kv.clone(),
                IdbStore::new(window.clone()),
            )),
            finder: FindMachine::new(KvProgressStore::new(kv.clone())),
            hints: HintEngine::new(StdRng::from_entropy()),
            hint_timer: None,
            viewport: Viewport::default(),
            settings,
            thumbnails: ThumbnailCache::new(),
            window,
            kv,
        }
    }

    /// Cancel any visible hint and its timer.
    pub fn clear_hint(&mut self) {
        self.hint_timer = None;
        self.hints.reset();
    }
}

thread_local! {
    pub static STATE: RefCell<Option<Rc<RefCell<Session>>>> = const { RefCell::new(None) };
}

pub fn session() -> Result<Rc<RefCell<Session>>, JsValue> {
    STATE
        .with(|st| st.borrow().clone())
        .ok_or_else(|| js_error("puzzle runtime not started"))
}

pub fn with_session<T>(f: impl FnOnce(&mut Session) -> T) -> Result<T, JsValue> {
    let session = session()?;
    let mut s = session.borrow_mut();
    Ok(f(&mut s))
}
