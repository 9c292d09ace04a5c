//! Browser Bindings
//!
//! Wires the tracker core to `localStorage`, animation frames and the page
//! markup. The pages build their own DOM; this module only reads events
//! from it and writes counters and classes back.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use js_sys::{Array, Object, Promise, Reflect};
use log::{debug, info, warn, LevelFilter};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Blob, Document, Element, HtmlElement, HtmlInputElement};

use crate::board::{import_message, ProgressBoard, SummaryView};
use crate::checklist::{ChecklistEngine, ChecklistView, SAVE_TOAST_MS};
use crate::config::{ChecklistEntry, TrackerConfig};
use crate::error::{TrackerError, TrackerResult};
use crate::models::{Category, ChecklistDefinition, ProgressTier, SelectAllState};
use crate::notifier::{ContextEvent, FrameClock, FrameId, PendingFrames};
use crate::store::RecordStore;

thread_local! {
    static LOG_BUFFER: RefCell<Option<ring_logger::RingBuffer>> = const { RefCell::new(None) };
}

fn init_runtime() {
    console_error_panic_hook::set_once();
    // Err when a second page script on the same document already installed it
    if let Ok(buffer) = ring_logger::init_logger(ring_logger::DEFAULT_CAPACITY, LevelFilter::Info) {
        LOG_BUFFER.with(|slot| *slot.borrow_mut() = Some(buffer));
    }
}

/// Most recent page log lines, oldest first
#[wasm_bindgen(js_name = recentLogs)]
pub fn recent_logs() -> Array {
    LOG_BUFFER.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|buffer| {
                buffer
                    .snapshot()
                    .iter()
                    .map(|entry| JsValue::from_str(&entry.to_string()))
                    .collect()
            })
            .unwrap_or_else(Array::new)
    })
}

fn to_js(err: TrackerError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn document() -> TrackerResult<Document> {
    web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| TrackerError::InvalidInput("no document".to_string()))
}

// ========================
// Record store
// ========================

/// `localStorage` of the current origin
pub struct LocalStorageStore {
    storage: web_sys::Storage,
}

impl LocalStorageStore {
    pub fn open() -> TrackerResult<Self> {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .ok_or_else(|| TrackerError::Storage("localStorage unavailable".to_string()))?;
        Ok(Self { storage })
    }
}

impl RecordStore for LocalStorageStore {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) -> TrackerResult<()> {
        self.storage
            .set_item(key, value)
            .map_err(|e| TrackerError::Storage(format!("{:?}", e)))
    }

    fn remove(&self, key: &str) -> TrackerResult<()> {
        self.storage
            .remove_item(key)
            .map_err(|e| TrackerError::Storage(format!("{:?}", e)))
    }
}

// ========================
// Animation frames
// ========================

/// `requestAnimationFrame`-backed clock calling `on_frame` when a frame fires
pub struct AnimationFrameClock {
    on_frame: Rc<dyn Fn(FrameId)>,
    pending: PendingFrames<Closure<dyn FnMut()>>,
}

impl AnimationFrameClock {
    pub fn new(on_frame: impl Fn(FrameId) + 'static) -> Self {
        Self {
            on_frame: Rc::new(on_frame),
            pending: PendingFrames::new(),
        }
    }
}

impl FrameClock for AnimationFrameClock {
    fn request_frame(&mut self) -> FrameId {
        self.pending.reap();
        let Some(window) = web_sys::window() else {
            return FrameId(0);
        };
        let id = Rc::new(Cell::new(0));
        let fired_id = Rc::clone(&id);
        let marker = self.pending.marker();
        let on_frame = Rc::clone(&self.on_frame);
        // Marked after `on_frame` so a frame requested from inside it
        // cannot drop the running callback
        let closure = Closure::<dyn FnMut()>::new(move || {
            let frame = FrameId(fired_id.get());
            on_frame(frame);
            marker.mark(frame);
        });
        let handle = match window.request_animation_frame(closure.as_ref().unchecked_ref()) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("requestAnimationFrame failed: {:?}", e);
                return FrameId(0);
            }
        };
        id.set(handle);
        self.pending.hold(FrameId(handle), closure);
        FrameId(handle)
    }

    fn cancel_frame(&mut self, frame: FrameId) {
        if let Some(window) = web_sys::window() {
            let _ = window.cancel_animation_frame(frame.0);
        }
        self.pending.release(frame);
        self.pending.reap();
    }
}

impl Drop for AnimationFrameClock {
    fn drop(&mut self) {
        self.pending.reap();
        if let Some(window) = web_sys::window() {
            for frame in self.pending.frames() {
                let _ = window.cancel_animation_frame(frame.0);
            }
        }
    }
}

// ========================
// Index page
// ========================

/// Class buttons of the index page
pub struct DomSummaryView {
    document: Document,
}

impl SummaryView for DomSummaryView {
    fn set_complete(&mut self, entry: &ChecklistEntry, complete: bool) {
        let selector = format!(".button-list a[href=\"{}\"]", entry.href);
        if let Ok(Some(link)) = self.document.query_selector(&selector) {
            let _ = link.class_list().toggle_with_force("complete", complete);
        }
    }
}

type IndexBoard = ProgressBoard<LocalStorageStore, AnimationFrameClock, DomSummaryView>;

fn listen(target: &web_sys::EventTarget, event: &str, handler: impl FnMut(web_sys::Event) + 'static) {
    let closure = Closure::<dyn FnMut(web_sys::Event)>::new(handler);
    let _ = target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
    closure.forget();
}

/// Bind the index page: class buttons, cross-tab refresh, export/import
#[wasm_bindgen]
pub fn start_index_page() -> Result<(), JsValue> {
    init_runtime();
    let document = document().map_err(to_js)?;
    let store = LocalStorageStore::open().map_err(to_js)?;

    let board: Rc<RefCell<IndexBoard>> = Rc::new_cyclic(|weak: &Weak<RefCell<IndexBoard>>| {
        let weak = weak.clone();
        let clock = AnimationFrameClock::new(move |frame| {
            if let Some(board) = weak.upgrade() {
                board.borrow_mut().on_frame(frame);
            }
        });
        let view = DomSummaryView {
            document: document.clone(),
        };
        RefCell::new(ProgressBoard::new(store, TrackerConfig::default(), clock, view))
    });
    board.borrow_mut().refresh_progress();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    {
        let board = Rc::clone(&board);
        listen(&window, "focus", move |_| {
            board.borrow_mut().handle_event(&ContextEvent::Focus);
        });
    }
    {
        let board = Rc::clone(&board);
        let doc = document.clone();
        listen(&document, "visibilitychange", move |_| {
            let visible = doc.visibility_state() == web_sys::VisibilityState::Visible;
            board.borrow_mut().handle_event(&ContextEvent::VisibilityChange { visible });
        });
    }
    {
        let board = Rc::clone(&board);
        listen(&window, "storage", move |event| {
            let key = event
                .dyn_ref::<web_sys::StorageEvent>()
                .and_then(|e| e.key());
            board.borrow_mut().handle_event(&ContextEvent::StorageChange { key });
        });
    }

    bind_backup_buttons(&document, &board);
    info!("Index page ready");
    Ok(())
}

fn bind_backup_buttons(document: &Document, board: &Rc<RefCell<IndexBoard>>) {
    if let Ok(Some(export_btn)) = document.query_selector("#export-btn") {
        let board = Rc::clone(board);
        listen(&export_btn, "click", move |_| {
            let (payload, file_name) = {
                let board = board.borrow();
                (board.export_json(), board.config().backup_file_name.clone())
            };
            spawn_local(export_progress(payload, file_name));
        });
    }

    let import_btn = document.query_selector("#import-btn").ok().flatten();
    let file_input = document
        .query_selector("#import-file")
        .ok()
        .flatten()
        .and_then(|el| el.dyn_into::<HtmlInputElement>().ok());
    let (Some(import_btn), Some(file_input)) = (import_btn, file_input) else {
        return;
    };

    {
        let file_input = file_input.clone();
        listen(&import_btn, "click", move |_| file_input.click());
    }
    let board = Rc::clone(board);
    let input = file_input.clone();
    listen(&file_input, "change", move |_| {
        let file = input.files().and_then(|files| files.get(0));
        // Allow re-selecting the same file later
        input.set_value("");
        let Some(file) = file else { return };
        let board = Rc::clone(&board);
        spawn_local(async move {
            let text = match JsFuture::from(file.text()).await {
                Ok(text) => text.as_string().unwrap_or_default(),
                Err(e) => {
                    alert(&format!("Import failed: {:?}", e));
                    return;
                }
            };
            let result = board.borrow_mut().import_json(&text);
            alert(&import_message(&result));
        });
    });
}

fn alert(message: &str) {
    if let Some(window) = web_sys::window() {
        let _ = window.alert_with_message(message);
    }
}

// ========================
// Export
// ========================

const SHARE_TITLE: &str = "EDF 4.1 Progress Backup";
const SHARE_TEXT: &str = "Your EDF 4.1 progress backup file.";
const JSON_TYPE: &str = "application/json";

/// Hand the backup to the user by the first route the browser supports:
/// share sheet, save dialog, download link, then a `data:` tab. A
/// cancelled share or dialog falls through to the next route.
async fn export_progress(payload: String, file_name: String) {
    match json_blob(&payload) {
        Ok(blob) => {
            match share_file(&blob, &file_name).await {
                Ok(()) => {
                    info!("Backup shared");
                    return;
                }
                Err(e) => debug!("Share skipped: {:?}", e),
            }
            match save_with_picker(&blob, &file_name).await {
                Ok(()) => {
                    info!("Backup saved");
                    return;
                }
                Err(e) => debug!("Save dialog skipped: {:?}", e),
            }
            match download_blob(&blob, &file_name) {
                Ok(()) => {
                    info!("Backup downloaded");
                    return;
                }
                Err(e) => warn!("Download failed: {:?}", e),
            }
        }
        Err(e) => warn!("Could not build backup blob: {:?}", e),
    }

    if let Err(e) = open_data_url(&payload) {
        warn!("Could not open backup tab: {:?}", e);
        alert("Could not trigger a download. As a last resort, copy the JSON printed to the console.");
        web_sys::console::log_1(&JsValue::from_str(&payload));
    }
}

fn json_blob(payload: &str) -> Result<Blob, JsValue> {
    let options = web_sys::BlobPropertyBag::new();
    options.set_type(JSON_TYPE);
    Blob::new_with_str_sequence_and_options(&Array::of1(&JsValue::from_str(payload)), &options)
}

fn window_value() -> Result<JsValue, JsValue> {
    web_sys::window()
        .map(JsValue::from)
        .ok_or_else(|| JsValue::from_str("no window"))
}

fn set(target: &Object, key: &str, value: &JsValue) -> Result<(), JsValue> {
    Reflect::set(target, &JsValue::from_str(key), value).map(|_| ())
}

fn method(target: &JsValue, name: &str) -> Result<js_sys::Function, JsValue> {
    Reflect::get(target, &JsValue::from_str(name))?
        .dyn_into()
        .map_err(|_| JsValue::from_str(&format!("{} unsupported", name)))
}

/// Call `target[name](...args)` and await the result if it is a promise
async fn call(target: &JsValue, name: &str, args: &Array) -> Result<JsValue, JsValue> {
    let result = method(target, name)?.apply(target, args)?;
    JsFuture::from(Promise::resolve(&result)).await
}

async fn share_file(blob: &Blob, file_name: &str) -> Result<(), JsValue> {
    let options = web_sys::FilePropertyBag::new();
    options.set_type(JSON_TYPE);
    let file = web_sys::File::new_with_blob_sequence_and_options(&Array::of1(blob), file_name, &options)?;

    let navigator = Reflect::get(&window_value()?, &JsValue::from_str("navigator"))?;
    let data = Object::new();
    set(&data, "files", &Array::of1(&file))?;
    if !method(&navigator, "canShare")?.call1(&navigator, &data)?.is_truthy() {
        return Err(JsValue::from_str("file sharing unsupported"));
    }
    set(&data, "title", &JsValue::from_str(SHARE_TITLE))?;
    set(&data, "text", &JsValue::from_str(SHARE_TEXT))?;
    call(&navigator, "share", &Array::of1(&data)).await.map(|_| ())
}

async fn save_with_picker(blob: &Blob, file_name: &str) -> Result<(), JsValue> {
    let accept = Object::new();
    set(&accept, JSON_TYPE, &Array::of1(&JsValue::from_str(".json")))?;
    let json_type = Object::new();
    set(&json_type, "description", &JsValue::from_str("JSON"))?;
    set(&json_type, "accept", &accept)?;
    let options = Object::new();
    set(&options, "suggestedName", &JsValue::from_str(file_name))?;
    set(&options, "types", &Array::of1(&json_type))?;

    let handle = call(&window_value()?, "showSaveFilePicker", &Array::of1(&options)).await?;
    let writable = call(&handle, "createWritable", &Array::new()).await?;
    call(&writable, "write", &Array::of1(blob)).await?;
    call(&writable, "close", &Array::new()).await?;
    Ok(())
}

fn download_blob(blob: &Blob, file_name: &str) -> Result<(), JsValue> {
    let document = document().map_err(to_js)?;
    let body = document.body().ok_or_else(|| JsValue::from_str("no body"))?;
    let url = web_sys::Url::create_object_url_with_blob(blob)?;

    let anchor: web_sys::HtmlAnchorElement = document.create_element("a")?.dyn_into()?;
    anchor.set_href(&url);
    anchor.set_download(file_name);
    anchor.set_rel("noopener");
    anchor.set_attribute("style", "display: none")?;
    body.append_child(&anchor)?;
    anchor.click();
    anchor.remove();

    gloo_timers::callback::Timeout::new(0, move || {
        let _ = web_sys::Url::revoke_object_url(&url);
    })
    .forget();
    Ok(())
}

fn open_data_url(payload: &str) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let url = format!(
        "data:application/json;charset=utf-8,{}",
        String::from(js_sys::encode_uri_component(payload))
    );
    window.open_with_url_and_target_and_features(&url, "_blank", "noopener")?;
    Ok(())
}

// ========================
// Class pages
// ========================

/// Counters, bulk toggle, save button and toast of a class page
pub struct DomChecklistView {
    document: Document,
}

impl DomChecklistView {
    fn find(&self, selector: &str) -> Option<Element> {
        self.document.query_selector(selector).ok().flatten()
    }
}

impl ChecklistView for DomChecklistView {
    fn show_category_count(&mut self, category: usize, checked: usize, total: usize) {
        let selector = format!(
            "#categories-container .category:nth-child({}) .header-count",
            category + 1
        );
        if let Some(el) = self.find(&selector) {
            el.set_text_content(Some(&format!("{}/{}", checked, total)));
        }
    }

    fn show_global_count(&mut self, checked: usize, total: usize, tier: ProgressTier) {
        let Some(el) = self.find("#global-count") else { return };
        el.set_text_content(Some(&format!("{}/{}", checked, total)));
        let classes = el.class_list();
        let _ = classes.remove_3("low", "medium", "complete");
        let _ = classes.add_1(tier.as_str());
    }

    fn show_select_all(&mut self, state: SelectAllState) {
        let Some(toggle) = self
            .find("#select-all-toggle")
            .and_then(|el| el.dyn_into::<HtmlInputElement>().ok())
        else {
            return;
        };
        toggle.set_checked(state == SelectAllState::Checked);
        toggle.set_indeterminate(state == SelectAllState::Indeterminate);
    }

    fn set_commit_enabled(&mut self, enabled: bool) {
        let Some(button) = self.find(".save-button") else { return };
        let _ = button.class_list().toggle_with_force("is-disabled", !enabled);
        let _ = button.set_attribute("aria-disabled", if enabled { "false" } else { "true" });
    }

    fn confirm_saved(&mut self) {
        let Some(toast) = self
            .find("#toast")
            .and_then(|el| el.dyn_into::<HtmlElement>().ok())
        else {
            return;
        };
        let _ = toast.class_list().add_1("show");
        gloo_timers::callback::Timeout::new(SAVE_TOAST_MS, move || {
            let _ = toast.class_list().remove_1("show");
        })
        .forget();
    }
}

/// JS handle of one class page's checklist engine
#[wasm_bindgen(js_name = ChecklistPage)]
pub struct ChecklistPageHandle {
    engine: ChecklistEngine<LocalStorageStore, DomChecklistView>,
}

#[wasm_bindgen(js_class = ChecklistPage)]
impl ChecklistPageHandle {
    /// `categories` is an array of `{id, title, names}`
    #[wasm_bindgen(constructor)]
    pub fn new(title: String, categories: JsValue, storage_key: String) -> Result<ChecklistPageHandle, JsValue> {
        init_runtime();
        let categories: Vec<Category> = serde_wasm_bindgen::from_value(categories)?;
        let definition = ChecklistDefinition::new(title, storage_key, categories);
        let store = LocalStorageStore::open().map_err(to_js)?;
        let view = DomChecklistView {
            document: document().map_err(to_js)?,
        };
        Ok(Self {
            engine: ChecklistEngine::new(definition, store, view),
        })
    }

    pub fn load(&mut self) -> Result<(), JsValue> {
        self.engine.load().map_err(to_js)
    }

    pub fn toggle(&mut self, category: usize, index: usize, checked: bool) -> Result<(), JsValue> {
        self.engine.set_item(category, index, checked).map_err(to_js)
    }

    #[wasm_bindgen(js_name = selectAll)]
    pub fn select_all(&mut self, checked: bool) {
        self.engine.set_all(checked);
    }

    pub fn save(&mut self) -> Result<bool, JsValue> {
        self.engine.save().map_err(to_js)
    }

    #[wasm_bindgen(getter)]
    pub fn dirty(&self) -> bool {
        self.engine.is_dirty()
    }

    #[wasm_bindgen(getter)]
    pub fn total(&self) -> usize {
        self.engine.total()
    }
}
