//! Offline Agent
//!
//! One installed version of the agent: its configuration, its lifecycle
//! state, and the cache storage and network it works against.

use std::cell::Cell;
use std::rc::Rc;

use reqwest::Url;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::domain::{AgentError, AgentRequest, AgentResult, WorkerState};
use crate::handlers::{self, FetchContext, FetchOutcome, Route};
use crate::network::Fetcher;
use crate::repository::CacheStorage;

pub struct OfflineAgent<C: CacheStorage, F: Fetcher> {
    config: AgentConfig,
    scope: Url,
    caches: Rc<C>,
    network: Rc<F>,
    state: Cell<WorkerState>,
}

impl<C: CacheStorage, F: Fetcher> OfflineAgent<C, F> {
    pub fn new(config: AgentConfig, scope: Url, caches: Rc<C>, network: Rc<F>) -> AgentResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            scope,
            caches,
            network,
            state: Cell::new(WorkerState::Installing),
        })
    }

    /// An agent the browser stopped and restarted in `state`
    ///
    /// Lifecycle events already delivered are not replayed, so the agent
    /// picks up where the previous run left off.
    pub fn restored(
        state: WorkerState,
        config: AgentConfig,
        scope: Url,
        caches: Rc<C>,
        network: Rc<F>,
    ) -> AgentResult<Self> {
        let agent = Self::new(config, scope, caches, network)?;
        agent.state.set(state);
        Ok(agent)
    }

    pub fn version(&self) -> &str {
        &self.config.cache_version
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    fn transition(&self, next: WorkerState) -> AgentResult<()> {
        let state = self.state.get().advance(next)?;
        self.state.set(state);
        Ok(())
    }

    /// Precache the manifest; a failure makes this version redundant
    pub async fn install(&self) -> AgentResult<usize> {
        if self.state.get() != WorkerState::Installing {
            return Err(AgentError::Lifecycle(format!(
                "{} is already {}",
                self.version(),
                self.state.get().as_str()
            )));
        }
        match handlers::precache(&*self.caches, &*self.network, &self.config, &self.scope).await {
            Ok(stored) => {
                self.transition(WorkerState::Installed)?;
                Ok(stored)
            }
            Err(err) => {
                warn!(version = %self.version(), error = %err, "install failed");
                self.transition(WorkerState::Redundant)?;
                Err(err)
            }
        }
    }

    /// Take over: drop every other version's namespace
    ///
    /// The agent ends up activated even if the cleanup fails; the error is
    /// still returned.
    pub async fn activate(&self) -> AgentResult<Vec<String>> {
        // A restart mid-activation is already activating
        if self.state.get() != WorkerState::Activating {
            self.transition(WorkerState::Activating)?;
        }
        let purged = handlers::purge_stale(&*self.caches, self.version()).await;
        self.transition(WorkerState::Activated)?;
        info!(version = %self.version(), "activated");
        purged
    }

    /// Mark this version as replaced
    pub fn retire(&self) {
        if self.state.get() != WorkerState::Redundant {
            self.state.set(WorkerState::Redundant);
        }
    }

    /// Strategy a request would take, without running it
    pub fn route(&self, request: &AgentRequest) -> Route {
        if self.state.get() != WorkerState::Activated {
            return Route::Passthrough;
        }
        handlers::classify(request, &self.scope)
    }

    /// Handle an intercepted request; only an activated agent intercepts
    pub async fn handle_fetch(&self, request: &AgentRequest) -> AgentResult<FetchOutcome> {
        self.handle_fetch_via(request, &*self.network).await
    }

    /// Handle an intercepted request, going to the network through `network`
    pub async fn handle_fetch_via<N: Fetcher>(
        &self,
        request: &AgentRequest,
        network: &N,
    ) -> AgentResult<FetchOutcome> {
        if self.state.get() != WorkerState::Activated {
            return Ok(FetchOutcome::Passthrough);
        }
        FetchContext {
            caches: &*self.caches,
            network,
            config: &self.config,
            scope: &self.scope,
        }
        .handle(request)
        .await
    }
}
