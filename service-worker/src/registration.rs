//! Registration
//!
//! Per-scope bookkeeping of agent versions: at most one active, at most one
//! waiting, and the clients the active version controls.

use std::collections::BTreeMap;
use std::rc::Rc;

use reqwest::Url;
use tracing::info;

use crate::agent::OfflineAgent;
use crate::config::AgentConfig;
use crate::domain::{AgentError, AgentRequest, AgentResult, WorkerState};
use crate::handlers::FetchOutcome;
use crate::network::Fetcher;
use crate::repository::CacheStorage;

/// Message a page may post to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate the waiting version now
    SkipWaiting,
}

impl ControlMessage {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "SKIP_WAITING" => Some(ControlMessage::SkipWaiting),
            _ => None,
        }
    }
}

pub struct Registration<C: CacheStorage, F: Fetcher> {
    scope: Url,
    caches: Rc<C>,
    network: Rc<F>,
    active: Option<OfflineAgent<C, F>>,
    waiting: Option<OfflineAgent<C, F>>,
    /// Client id -> version controlling it
    clients: BTreeMap<String, Option<String>>,
}

impl<C: CacheStorage, F: Fetcher> Registration<C, F> {
    pub fn new(scope: Url, caches: Rc<C>, network: Rc<F>) -> Self {
        Self {
            scope,
            caches,
            network,
            active: None,
            waiting: None,
            clients: BTreeMap::new(),
        }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn active(&self) -> Option<&OfflineAgent<C, F>> {
        self.active.as_ref()
    }

    pub fn waiting(&self) -> Option<&OfflineAgent<C, F>> {
        self.waiting.as_ref()
    }

    pub fn active_version(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.version())
    }

    /// Install a new version; activate it right away when it skips waiting
    ///
    /// On failure the current active version keeps serving.
    pub async fn update(&mut self, config: AgentConfig) -> AgentResult<WorkerState> {
        let skip_waiting = config.skip_waiting;
        let agent = OfflineAgent::new(
            config,
            self.scope.clone(),
            Rc::clone(&self.caches),
            Rc::clone(&self.network),
        )?;
        agent.install().await?;

        if let Some(previous) = self.waiting.replace(agent) {
            previous.retire();
        }
        if skip_waiting {
            self.activate_waiting().await?;
            return Ok(WorkerState::Activated);
        }
        Ok(WorkerState::Installed)
    }

    /// Promote the waiting version, retire the old one, claim every client
    pub async fn activate_waiting(&mut self) -> AgentResult<Vec<String>> {
        let agent = self
            .waiting
            .take()
            .ok_or_else(|| AgentError::Lifecycle("no waiting version".to_string()))?;
        if let Some(old) = self.active.take() {
            old.retire();
        }

        let purged = agent.activate().await;
        let version = agent.version().to_string();
        self.active = Some(agent);
        for controller in self.clients.values_mut() {
            *controller = Some(version.clone());
        }
        info!(version = %version, clients = self.clients.len(), "claimed clients");
        purged
    }

    /// Handle a posted message; `true` when it changed the active version
    pub async fn post_message(&mut self, data: &str) -> AgentResult<bool> {
        match ControlMessage::parse(data) {
            Some(ControlMessage::SkipWaiting) if self.waiting.is_some() => {
                self.activate_waiting().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// A page opened in scope; it is controlled by the active version
    pub fn connect_client(&mut self, id: &str) -> Option<&str> {
        let version = self.active_version().map(str::to_string);
        self.clients.insert(id.to_string(), version);
        self.controller(id)
    }

    pub fn disconnect_client(&mut self, id: &str) {
        self.clients.remove(id);
    }

    pub fn controller(&self, id: &str) -> Option<&str> {
        self.clients.get(id).and_then(|v| v.as_deref())
    }

    /// Route a request through the active version, if any
    pub async fn handle_fetch(&self, request: &AgentRequest) -> AgentResult<FetchOutcome> {
        match &self.active {
            Some(agent) => agent.handle_fetch(request).await,
            None => Ok(FetchOutcome::Passthrough),
        }
    }
}
