//! Service Worker Bindings
//!
//! Runs one agent version inside a service worker global scope: browser
//! Cache API storage, `install`/`activate`/`fetch`/`message` listeners.
//! Network and cache responses are the browser's own objects and reach the
//! page unchanged.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Array, Promise, Reflect};
use reqwest::Url;
use tracing::{error, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{
    Cache, CacheQueryOptions, ExtendableEvent, ExtendableMessageEvent, FetchEvent, Headers,
    Request, Response, ResponseInit, ServiceWorkerGlobalScope,
};

use crate::agent::OfflineAgent;
use crate::config::AgentConfig;
use crate::domain::{AgentError, AgentRequest, AgentResponse, AgentResult, Destination, RequestMode, WorkerState};
use crate::handlers::{FetchOutcome, Route};
use crate::network::Fetcher;
use crate::registration::ControlMessage;
use crate::repository::{cache_key, CacheStorage, MatchOptions};

type BrowserAgent = OfflineAgent<BrowserCacheStorage, BrowserFetcher>;

thread_local! {
    static LOG_BUFFER: RefCell<Option<ring_logger::RingBuffer>> = const { RefCell::new(None) };
}

/// Most recent agent log lines, oldest first
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

fn cache_err(e: JsValue) -> AgentError {
    AgentError::Cache(format!("{:?}", e))
}

async fn resolve(promise: Promise) -> AgentResult<JsValue> {
    JsFuture::from(promise).await.map_err(cache_err)
}

// ========================
// Cache storage
// ========================

/// The worker's `caches` object
pub struct BrowserCacheStorage {
    caches: web_sys::CacheStorage,
}

impl BrowserCacheStorage {
    pub fn new(scope: &ServiceWorkerGlobalScope) -> AgentResult<Self> {
        let caches = scope.caches().map_err(cache_err)?;
        Ok(Self { caches })
    }

    async fn open(&self, namespace: &str) -> AgentResult<Cache> {
        resolve(self.caches.open(namespace))
            .await?
            .dyn_into::<Cache>()
            .map_err(cache_err)
    }
}

#[async_trait(?Send)]
impl CacheStorage for BrowserCacheStorage {
    async fn keys(&self) -> AgentResult<Vec<String>> {
        let keys: Array = resolve(self.caches.keys()).await?.unchecked_into();
        Ok(keys.iter().filter_map(|k| k.as_string()).collect())
    }

    async fn has(&self, namespace: &str) -> AgentResult<bool> {
        Ok(resolve(self.caches.has(namespace)).await?.is_truthy())
    }

    async fn delete(&self, namespace: &str) -> AgentResult<bool> {
        Ok(resolve(self.caches.delete(namespace)).await?.is_truthy())
    }

    async fn put(&self, namespace: &str, url: &Url, response: &AgentResponse) -> AgentResult<()> {
        let cache = self.open(namespace).await?;
        let res = storable_response(response).map_err(cache_err)?;
        resolve(cache.put_with_str(&cache_key(url, MatchOptions::exact()), &res)).await?;
        Ok(())
    }

    async fn put_all(&self, namespace: &str, entries: &[(Url, AgentResponse)]) -> AgentResult<()> {
        let cache = self.open(namespace).await?;
        for (url, response) in entries {
            let res = storable_response(response).map_err(cache_err)?;
            resolve(cache.put_with_str(&cache_key(url, MatchOptions::exact()), &res)).await?;
        }
        Ok(())
    }

    async fn match_in(
        &self,
        namespace: &str,
        url: &Url,
        options: MatchOptions,
    ) -> AgentResult<Option<AgentResponse>> {
        if !self.has(namespace).await? {
            return Ok(None);
        }
        let cache = self.open(namespace).await?;
        let query = CacheQueryOptions::new();
        query.set_ignore_search(options.ignore_search);
        let found = resolve(cache.match_with_str_and_options(url.as_str(), &query)).await?;
        from_js_match(found)
    }

    async fn match_any(&self, url: &Url, options: MatchOptions) -> AgentResult<Option<AgentResponse>> {
        let query = CacheQueryOptions::new();
        query.set_ignore_search(options.ignore_search);
        let found = resolve(self.caches.match_with_str_and_options(url.as_str(), &query)).await?;
        from_js_match(found)
    }
}

// ========================
// Network
// ========================

/// The worker's own `fetch`
///
/// Built per fetch event with the intercepted request, which is forwarded
/// as-is so mode, credentials and redirects behave as without the agent.
pub struct BrowserFetcher {
    scope: ServiceWorkerGlobalScope,
    intercepted: Option<Request>,
}

impl BrowserFetcher {
    pub fn new(scope: ServiceWorkerGlobalScope) -> Self {
        Self {
            scope,
            intercepted: None,
        }
    }

    pub fn for_request(scope: ServiceWorkerGlobalScope, request: Request) -> Self {
        Self {
            scope,
            intercepted: Some(request),
        }
    }
}

#[async_trait(?Send)]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, request: &AgentRequest) -> AgentResult<AgentResponse> {
        let promise = match &self.intercepted {
            Some(original) if original.url() == request.url.as_str() && original.method() == request.method => {
                self.scope.fetch_with_request(original)
            }
            _ => self.scope.fetch_with_str(request.url.as_str()),
        };
        let response: Response = JsFuture::from(promise)
            .await
            .and_then(|value| value.dyn_into())
            .map_err(|e| AgentError::Network(format!("{}: {:?}", request.url, e)))?;
        Ok(wrap_native(response))
    }
}

// ========================
// Conversions
// ========================

fn js_str(target: &JsValue, field: &str) -> Option<String> {
    Reflect::get(target, &JsValue::from_str(field))
        .ok()
        .and_then(|v| v.as_string())
}

fn mode_from_str(mode: &str) -> RequestMode {
    match mode {
        "navigate" => RequestMode::Navigate,
        "same-origin" => RequestMode::SameOrigin,
        "cors" => RequestMode::Cors,
        _ => RequestMode::NoCors,
    }
}

fn from_js_request(request: &Request) -> AgentResult<AgentRequest> {
    let url = Url::parse(&request.url())
        .map_err(|e| AgentError::Network(format!("bad request url: {}", e)))?;
    let accept = request.headers().get("accept").ok().flatten();
    Ok(AgentRequest {
        method: request.method(),
        url,
        mode: js_str(request, "mode").map(|m| mode_from_str(&m)).unwrap_or_default(),
        destination: js_str(request, "destination")
            .map(|d| Destination::from_str(&d))
            .unwrap_or_default(),
        accept,
    })
}

fn wrap_native(response: Response) -> AgentResponse {
    AgentResponse {
        status: response.status(),
        url: Url::parse(&response.url()).ok(),
        headers: Vec::new(),
        body: Vec::new(),
        native: Some(response),
    }
}

/// Response to hand to the page: the browser's own one when there is one
fn to_js_response(response: &AgentResponse) -> Result<Response, JsValue> {
    if let Some(native) = &response.native {
        return Ok(Clone::clone(native));
    }
    let headers = Headers::new()?;
    for (name, value) in &response.headers {
        headers.append(name, value)?;
    }
    let init = ResponseInit::new();
    init.set_status(response.status);
    init.set_headers(&headers);
    if response.is_null_body_status() {
        return Response::new_with_opt_u8_array_and_init(None, &init);
    }
    let mut body = response.body.clone();
    Response::new_with_opt_u8_array_and_init(Some(&mut body), &init)
}

/// Response to store: a copy, so the original body stays readable
fn storable_response(response: &AgentResponse) -> Result<Response, JsValue> {
    match &response.native {
        Some(native) => native.clone(),
        None => to_js_response(response),
    }
}

fn from_js_match(found: JsValue) -> AgentResult<Option<AgentResponse>> {
    if found.is_undefined() || found.is_null() {
        return Ok(None);
    }
    let response: Response = found.dyn_into().map_err(cache_err)?;
    Ok(Some(wrap_native(response)))
}

// ========================
// Event listeners
// ========================

fn listen<E: JsCast + 'static>(scope: &ServiceWorkerGlobalScope, event: &str, handler: impl FnMut(E) + 'static) {
    let closure = Closure::<dyn FnMut(E)>::new(handler);
    let _ = scope.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
    closure.forget();
}

fn agent_promise<Fut>(fut: Fut) -> Promise
where
    Fut: std::future::Future<Output = AgentResult<JsValue>> + 'static,
{
    future_to_promise(async move { fut.await.map_err(|e| JsValue::from_str(&e.to_string())) })
}

/// Current state of this worker as the browser reports it
fn reported_state(scope: &ServiceWorkerGlobalScope) -> Option<WorkerState> {
    let worker = Reflect::get(scope, &JsValue::from_str("serviceWorker")).ok()?;
    js_str(&worker, "state").and_then(|s| WorkerState::parse(&s))
}

/// Start the agent in this service worker; `config_json` may be empty for defaults
#[wasm_bindgen]
pub fn start_offline_agent(config_json: &str) -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    let buffer = ring_logger::RingBuffer::new(ring_logger::DEFAULT_CAPACITY);
    if ring_logger::init_tracing(buffer.clone()).is_ok() {
        LOG_BUFFER.with(|slot| *slot.borrow_mut() = Some(buffer));
    }

    let to_js = |e: AgentError| JsValue::from_str(&e.to_string());
    let config = if config_json.trim().is_empty() {
        AgentConfig::default()
    } else {
        AgentConfig::from_json(config_json).map_err(to_js)?
    };

    let scope: ServiceWorkerGlobalScope = js_sys::global().dyn_into()?;
    let scope_url = Url::parse(&scope.registration().scope())
        .map_err(|e| JsValue::from_str(&format!("bad scope: {}", e)))?;
    let caches = Rc::new(BrowserCacheStorage::new(&scope).map_err(to_js)?);
    let network = Rc::new(BrowserFetcher::new(scope.clone()));

    let skip_waiting = config.skip_waiting;
    let agent = match reported_state(&scope) {
        // Stopped while idle and restarted; events already delivered do not repeat
        Some(state @ (WorkerState::Installed | WorkerState::Activating | WorkerState::Activated)) => {
            OfflineAgent::restored(state, config, scope_url, caches, network)
        }
        _ => OfflineAgent::new(config, scope_url, caches, network),
    }
    .map_err(to_js)?;
    let agent: Rc<BrowserAgent> = Rc::new(agent);

    {
        let agent = Rc::clone(&agent);
        let sw = scope.clone();
        listen(&scope, "install", move |event: ExtendableEvent| {
            let agent = Rc::clone(&agent);
            let sw = sw.clone();
            let promise = agent_promise(async move {
                agent.install().await?;
                if skip_waiting {
                    if let Ok(p) = sw.skip_waiting() {
                        let _ = JsFuture::from(p).await;
                    }
                }
                Ok(JsValue::UNDEFINED)
            });
            let _ = event.wait_until(&promise);
        });
    }

    {
        let agent = Rc::clone(&agent);
        let sw = scope.clone();
        listen(&scope, "activate", move |event: ExtendableEvent| {
            let agent = Rc::clone(&agent);
            let clients = sw.clients();
            let promise = agent_promise(async move {
                let purged = agent.activate().await;
                if let Err(e) = JsFuture::from(clients.claim()).await {
                    warn!("clients.claim failed: {:?}", e);
                }
                purged.map(|_| JsValue::UNDEFINED)
            });
            let _ = event.wait_until(&promise);
        });
    }

    {
        let agent = Rc::clone(&agent);
        let sw = scope.clone();
        listen(&scope, "fetch", move |event: FetchEvent| {
            let intercepted = event.request();
            let request = match from_js_request(&intercepted) {
                Ok(request) => request,
                Err(e) => {
                    warn!("not intercepting: {}", e);
                    return;
                }
            };
            if agent.route(&request) == Route::Passthrough {
                return;
            }
            let agent = Rc::clone(&agent);
            let network = BrowserFetcher::for_request(sw.clone(), intercepted);
            let promise = future_to_promise(async move {
                match agent.handle_fetch_via(&request, &network).await {
                    Ok(FetchOutcome::Respond(res)) => to_js_response(&res).map(JsValue::from),
                    // Let the browser fail the request the way it normally would
                    Ok(FetchOutcome::Passthrough) => Err(JsValue::from_str("not handled")),
                    Err(e) => {
                        error!(url = %request.url, error = %e, "fetch failed");
                        Err(JsValue::from_str(&e.to_string()))
                    }
                }
            });
            let _ = event.respond_with(&promise);
        });
    }

    {
        let sw = scope.clone();
        listen(&scope, "message", move |event: ExtendableMessageEvent| {
            let data = event.data().as_string().unwrap_or_default();
            if ControlMessage::parse(&data) == Some(ControlMessage::SkipWaiting) {
                info!("skip waiting requested");
                let _ = sw.skip_waiting();
            }
        });
    }

    info!(version = %agent.version(), "offline agent started");
    Ok(())
}
