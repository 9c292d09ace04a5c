//! Agent Scenario Tests
//!
//! Install, activate and fetch flows against in-memory caches and a
//! scripted network.

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use async_trait::async_trait;
    use reqwest::Url;
    use ring_logger::{RingBuffer, RingLayer};
    use tracing_subscriber::layer::SubscriberExt;

    use crate::domain::{AgentError, AgentRequest, AgentResponse, AgentResult, Destination, WorkerState};
    use crate::{
        AgentConfig, AssetMatch, CacheStorage, Fetcher, FetchOutcome, MatchOptions, MemoryCacheStorage,
        OfflineAgent, Registration,
    };

    const SCOPE: &str = "https://edf.example/";

    /// Network whose contents and connectivity the test controls
    #[derive(Default)]
    struct ScriptedNetwork {
        pages: RefCell<BTreeMap<String, AgentResponse>>,
        offline: Cell<bool>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedNetwork {
        fn serve(&self, path: &str, status: u16, body: &str) {
            let url = scope().join(path).expect("valid path");
            self.pages
                .borrow_mut()
                .insert(url.to_string(), AgentResponse::new(status, body).with_url(url));
        }

        fn go_offline(&self) {
            self.offline.set(true);
        }

        fn calls(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    #[async_trait(?Send)]
    impl Fetcher for ScriptedNetwork {
        async fn fetch(&self, request: &AgentRequest) -> AgentResult<AgentResponse> {
            self.calls.borrow_mut().push(request.url.to_string());
            if self.offline.get() {
                return Err(AgentError::Network("offline".to_string()));
            }
            let mut key = request.url.clone();
            key.set_fragment(None);
            Ok(self
                .pages
                .borrow()
                .get(key.as_str())
                .cloned()
                .unwrap_or_else(|| AgentResponse::new(404, "not found")))
        }
    }

    fn scope() -> Url {
        Url::parse(SCOPE).unwrap()
    }

    fn url(path: &str) -> Url {
        scope().join(path).unwrap()
    }

    fn config(version: &str, precache: &[&str]) -> AgentConfig {
        AgentConfig::default().with_version(version).with_precache(precache)
    }

    fn setup() -> (Rc<MemoryCacheStorage>, Rc<ScriptedNetwork>) {
        let network = Rc::new(ScriptedNetwork::default());
        network.serve("./", 200, "<html>root</html>");
        network.serve("./index.html", 200, "<html>index</html>");
        network.serve("./a.css", 200, "a {}");
        network.serve("./app.js", 200, "run()");
        (Rc::new(MemoryCacheStorage::new()), network)
    }

    fn body(outcome: &FetchOutcome) -> String {
        outcome.response().map(|r| r.text()).unwrap_or_default()
    }

    async fn active_agent(
        precache: &[&str],
    ) -> (OfflineAgent<MemoryCacheStorage, ScriptedNetwork>, Rc<MemoryCacheStorage>, Rc<ScriptedNetwork>) {
        let (caches, network) = setup();
        let agent = OfflineAgent::new(
            config("v1", precache),
            scope(),
            Rc::clone(&caches),
            Rc::clone(&network),
        )
        .unwrap();
        agent.install().await.expect("install failed");
        agent.activate().await.expect("activate failed");
        (agent, caches, network)
    }

    #[tokio::test]
    async fn test_install_then_serve_offline() {
        let (agent, caches, network) = active_agent(&["./", "./index.html", "./a.css"]).await;
        assert_eq!(agent.state(), WorkerState::Activated);
        assert_eq!(caches.len("v1").await, Some(3));

        network.go_offline();
        let req = AgentRequest::subresource(url("/a.css"), Destination::Style);
        let outcome = agent.handle_fetch(&req).await.unwrap();

        assert_eq!(body(&outcome), "a {}");
    }

    #[tokio::test]
    async fn test_install_failure_writes_nothing() {
        let (caches, network) = setup();
        let agent = OfflineAgent::new(
            config("v1", &["./index.html", "./missing.png"]),
            scope(),
            Rc::clone(&caches),
            network,
        )
        .unwrap();

        let err = agent.install().await.unwrap_err();

        assert!(matches!(err, AgentError::Precache { ref url, .. } if url.ends_with("missing.png")));
        assert_eq!(agent.state(), WorkerState::Redundant);
        assert!(!caches.has("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_install_offline_is_precache_error() {
        let (caches, network) = setup();
        network.go_offline();
        let agent = OfflineAgent::new(config("v1", &["./"]), scope(), caches, network).unwrap();

        assert!(matches!(agent.install().await, Err(AgentError::Precache { .. })));
    }

    #[tokio::test]
    async fn test_install_twice_rejected() {
        let (agent, _, _) = active_agent(&["./"]).await;

        assert!(matches!(agent.install().await, Err(AgentError::Lifecycle(_))));
    }

    #[tokio::test]
    async fn test_not_activated_passes_through() {
        let (caches, network) = setup();
        let agent = OfflineAgent::new(config("v1", &["./a.css"]), scope(), caches, network).unwrap();
        agent.install().await.unwrap();

        let req = AgentRequest::subresource(url("/a.css"), Destination::Style);
        assert_eq!(agent.handle_fetch(&req).await.unwrap(), FetchOutcome::Passthrough);
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let (agent, _, network) = active_agent(&["./a.css"]).await;
        let calls = network.calls();

        let req = AgentRequest::get(url("/a.css")).with_method("POST");
        let outcome = agent.handle_fetch(&req).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Passthrough);
        assert_eq!(network.calls(), calls);
    }

    #[tokio::test]
    async fn test_navigation_ignores_query() {
        let (agent, _, network) = active_agent(&["./index.html"]).await;
        network.go_offline();

        let req = AgentRequest::navigation(url("/index.html?utm=home"));
        let outcome = agent.handle_fetch(&req).await.unwrap();

        assert_eq!(body(&outcome), "<html>index</html>");
    }

    #[tokio::test]
    async fn test_navigation_caches_network_page() {
        let (agent, caches, network) = active_agent(&["./index.html"]).await;
        network.serve("./Fencer.html", 200, "<html>fencer</html>");

        let req = AgentRequest::navigation(url("/Fencer.html"));
        let online = agent.handle_fetch(&req).await.unwrap();
        assert_eq!(body(&online), "<html>fencer</html>");

        network.go_offline();
        let offline = agent.handle_fetch(&req).await.unwrap();
        assert_eq!(body(&offline), "<html>fencer</html>");
        assert_eq!(caches.len("v1").await, Some(2));
    }

    #[tokio::test]
    async fn test_navigation_error_status_not_cached() {
        let (agent, caches, _) = active_agent(&["./index.html"]).await;

        let req = AgentRequest::navigation(url("/Gone.html"));
        let outcome = agent.handle_fetch(&req).await.unwrap();

        assert_eq!(outcome.response().map(|r| r.status), Some(404));
        assert_eq!(caches.len("v1").await, Some(1));
    }

    #[tokio::test]
    async fn test_navigation_offline_falls_back_to_index() {
        let (agent, _, network) = active_agent(&["./index.html"]).await;
        network.go_offline();

        let req = AgentRequest::navigation(url("/Ranger.html"));
        let outcome = agent.handle_fetch(&req).await.unwrap();

        assert_eq!(body(&outcome), "<html>index</html>");
    }

    #[tokio::test]
    async fn test_navigation_offline_placeholder() {
        let (agent, _, network) = active_agent(&["./a.css"]).await;
        network.go_offline();

        let req = AgentRequest::get(url("/Ranger.html")).with_accept("text/html");
        let outcome = agent.handle_fetch(&req).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Respond(AgentResponse::offline_placeholder()));
    }

    #[tokio::test]
    async fn test_static_asset_match_modes() {
        let (caches, network) = setup();
        let versioned = AgentRequest::subresource(url("/a.css?v=2"), Destination::Style);

        let loose = OfflineAgent::new(config("v1", &["./a.css"]), scope(), Rc::clone(&caches), Rc::clone(&network))
            .unwrap();
        loose.install().await.unwrap();
        loose.activate().await.unwrap();
        network.go_offline();
        assert_eq!(body(&loose.handle_fetch(&versioned).await.unwrap()), "a {}");

        let mut strict_config = config("v1", &["./a.css"]);
        strict_config.asset_match = AssetMatch::Exact;
        let strict =
            OfflineAgent::restored(WorkerState::Activated, strict_config, scope(), caches, network).unwrap();
        assert!(matches!(
            strict.handle_fetch(&versioned).await,
            Err(AgentError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_static_asset_network_error_surfaces() {
        let (agent, _, network) = active_agent(&["./index.html"]).await;
        network.go_offline();

        let req = AgentRequest::subresource(url("/missing.png"), Destination::Image);
        assert!(matches!(agent.handle_fetch(&req).await, Err(AgentError::Network(_))));
    }

    #[tokio::test]
    async fn test_static_asset_runtime_cached() {
        let (agent, caches, network) = active_agent(&["./index.html"]).await;

        let req = AgentRequest::subresource(url("/app.js"), Destination::Script);
        agent.handle_fetch(&req).await.unwrap();
        let cached = caches.match_in("v1", &url("/app.js"), MatchOptions::exact()).await.unwrap();
        assert!(cached.is_some());

        network.go_offline();
        assert_eq!(body(&agent.handle_fetch(&req).await.unwrap()), "run()");
    }

    #[tokio::test]
    async fn test_cross_origin_not_cached() {
        let (agent, caches, _) = active_agent(&["./index.html"]).await;
        let font = Url::parse("https://fonts.example/x.ttf").unwrap();

        let req = AgentRequest::subresource(font.clone(), Destination::Font);
        let outcome = agent.handle_fetch(&req).await.unwrap();

        assert_eq!(outcome.response().map(|r| r.status), Some(404));
        assert!(caches.match_any(&font, MatchOptions::exact()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_route_reads_any_namespace() {
        let (agent, caches, network) = active_agent(&["./index.html"]).await;
        caches
            .put("legacy", &url("/manifest.webmanifest"), &AgentResponse::new(200, "{}"))
            .await
            .unwrap();
        network.go_offline();

        let req = AgentRequest::get(url("/manifest.webmanifest?x=1"));
        assert_eq!(body(&agent.handle_fetch(&req).await.unwrap()), "{}");

        let miss = AgentRequest::get(url("/data.json"));
        assert!(matches!(agent.handle_fetch(&miss).await, Err(AgentError::Network(_))));
    }

    #[tokio::test]
    async fn test_update_replaces_version() {
        let (caches, network) = setup();
        let mut registration = Registration::new(scope(), Rc::clone(&caches), Rc::clone(&network));
        registration.connect_client("tab-1");

        registration.update(config("v1", &["./a.css"])).await.unwrap();
        assert_eq!(registration.active_version(), Some("v1"));
        assert_eq!(registration.controller("tab-1"), Some("v1"));

        let state = registration.update(config("v2", &["./a.css"])).await.unwrap();

        assert_eq!(state, WorkerState::Activated);
        assert_eq!(registration.active_version(), Some("v2"));
        assert_eq!(registration.controller("tab-1"), Some("v2"));
        assert_eq!(caches.keys().await.unwrap(), vec!["v2"]);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_active() {
        let (caches, network) = setup();
        let mut registration = Registration::new(scope(), Rc::clone(&caches), Rc::clone(&network));
        registration.update(config("v1", &["./a.css"])).await.unwrap();

        let result = registration.update(config("v2", &["./a.css", "./gone.css"])).await;

        assert!(matches!(result, Err(AgentError::Precache { .. })));
        assert_eq!(registration.active_version(), Some("v1"));
        assert!(registration.waiting().is_none());
        assert_eq!(caches.keys().await.unwrap(), vec!["v1"]);

        network.go_offline();
        let req = AgentRequest::subresource(url("/a.css"), Destination::Style);
        assert_eq!(body(&registration.handle_fetch(&req).await.unwrap()), "a {}");
    }

    #[tokio::test]
    async fn test_waiting_until_skip_message() {
        let (caches, network) = setup();
        let mut registration = Registration::new(scope(), Rc::clone(&caches), network);
        registration.update(config("v1", &["./a.css"])).await.unwrap();

        let mut next = config("v2", &["./a.css"]);
        next.skip_waiting = false;
        let state = registration.update(next).await.unwrap();

        assert_eq!(state, WorkerState::Installed);
        assert_eq!(registration.active_version(), Some("v1"));
        assert_eq!(caches.keys().await.unwrap(), vec!["v1", "v2"]);

        assert!(!registration.post_message("HELLO").await.unwrap());
        assert!(registration.post_message("SKIP_WAITING").await.unwrap());
        assert_eq!(registration.active_version(), Some("v2"));
        assert_eq!(caches.keys().await.unwrap(), vec!["v2"]);
        assert!(!registration.post_message("SKIP_WAITING").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_active_version_passes_through() {
        let (caches, network) = setup();
        let registration = Registration::new(scope(), caches, network);

        let req = AgentRequest::navigation(url("/index.html"));
        assert_eq!(registration.handle_fetch(&req).await.unwrap(), FetchOutcome::Passthrough);
        assert!(registration.active().is_none());
    }

    #[tokio::test]
    async fn test_activate_without_waiting_rejected() {
        let (caches, network) = setup();
        let mut registration = Registration::new(scope(), caches, network);

        assert!(matches!(
            registration.activate_waiting().await,
            Err(AgentError::Lifecycle(_))
        ));
    }

    #[tokio::test]
    async fn test_restarted_installed_agent_activates() {
        let (caches, network) = setup();
        let first = OfflineAgent::new(config("v1", &["./a.css"]), scope(), Rc::clone(&caches), Rc::clone(&network))
            .unwrap();
        first.install().await.unwrap();
        drop(first);

        let agent = OfflineAgent::restored(
            WorkerState::Installed,
            config("v1", &["./a.css"]),
            scope(),
            Rc::clone(&caches),
            Rc::clone(&network),
        )
        .unwrap();
        assert!(matches!(agent.install().await, Err(AgentError::Lifecycle(_))));
        agent.activate().await.unwrap();

        assert_eq!(agent.state(), WorkerState::Activated);
        network.go_offline();
        let req = AgentRequest::subresource(url("/a.css"), Destination::Style);
        assert_eq!(body(&agent.handle_fetch(&req).await.unwrap()), "a {}");
    }

    #[tokio::test]
    async fn test_restarted_mid_activation_finishes() {
        let (caches, network) = setup();
        caches.put("v0", &url("/old.css"), &AgentResponse::new(200, "old")).await.unwrap();
        let agent = OfflineAgent::restored(
            WorkerState::Activating,
            config("v1", &["./a.css"]),
            scope(),
            Rc::clone(&caches),
            network,
        )
        .unwrap();

        assert_eq!(agent.activate().await.unwrap(), vec!["v0"]);
        assert_eq!(agent.state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_before_install_rejected() {
        let (caches, network) = setup();
        let agent = OfflineAgent::new(config("v1", &["./a.css"]), scope(), caches, network).unwrap();

        assert!(matches!(agent.activate().await, Err(AgentError::Lifecycle(_))));
        assert_eq!(agent.route(&AgentRequest::get(url("/a.css"))), crate::Route::Passthrough);
    }

    #[tokio::test]
    async fn test_fetch_via_request_network() {
        let (agent, _, network) = active_agent(&["./index.html"]).await;
        network.go_offline();

        let (_, live) = setup();
        live.serve("./data.json", 200, "{\"ok\":true}");
        let req = AgentRequest::get(url("/data.json"));
        let outcome = agent.handle_fetch_via(&req, &*live).await.unwrap();

        assert_eq!(body(&outcome), "{\"ok\":true}");
        assert_eq!(live.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_install_is_logged() {
        let buffer = RingBuffer::new(16);
        let subscriber = tracing_subscriber::registry().with(RingLayer::new(buffer.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let (caches, network) = setup();
        let agent = OfflineAgent::new(config("v1", &["./gone.css"]), scope(), caches, network).unwrap();
        assert!(agent.install().await.is_err());

        let logged = buffer.snapshot();
        let warning = logged
            .iter()
            .find(|e| e.level == log::Level::Warn)
            .expect("no warning captured");
        assert!(warning.message.starts_with("install failed"));
        assert!(warning.message.contains("version=v1"));
    }

    #[tokio::test]
    async fn test_offline_navigation_is_logged() {
        let buffer = RingBuffer::new(16);
        let subscriber = tracing_subscriber::registry().with(RingLayer::new(buffer.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let (agent, _, network) = active_agent(&["./index.html"]).await;
        network.go_offline();
        let req = AgentRequest::navigation(url("/a.css"));
        agent.handle_fetch(&req).await.unwrap();

        assert!(buffer
            .snapshot()
            .iter()
            .any(|e| e.level == log::Level::Warn && e.message.starts_with("navigation offline")));
    }
}
