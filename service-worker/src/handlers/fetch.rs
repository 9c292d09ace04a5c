//! Fetch Strategies
//!
//! Routing of intercepted requests: navigations, same-origin static
//! assets and everything else.

use reqwest::Url;
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::domain::{is_same_origin, AgentError, AgentRequest, AgentResponse, AgentResult};
use crate::network::Fetcher;
use crate::repository::{CacheStorage, MatchOptions};

/// What the agent does with an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the browser performs the request itself
    Passthrough,
    Respond(AgentResponse),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&AgentResponse> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Respond(res) => Some(res),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Passthrough,
    Navigation,
    StaticAsset,
    Default,
}

/// Pick the strategy for a request
pub fn classify(request: &AgentRequest, scope: &Url) -> Route {
    if !request.is_get() {
        Route::Passthrough
    } else if request.is_navigation() {
        Route::Navigation
    } else if is_same_origin(&request.url, scope) && request.destination.is_static_asset() {
        Route::StaticAsset
    } else {
        Route::Default
    }
}

/// Shared state every strategy reads
pub struct FetchContext<'a, C: CacheStorage, F: Fetcher> {
    pub caches: &'a C,
    pub network: &'a F,
    pub config: &'a AgentConfig,
    pub scope: &'a Url,
}

impl<'a, C: CacheStorage, F: Fetcher> FetchContext<'a, C, F> {
    /// Route a request and run its strategy
    pub async fn handle(&self, request: &AgentRequest) -> AgentResult<FetchOutcome> {
        let route = classify(request, self.scope);
        debug!(url = %request.url, route = ?route, "fetch");
        let response = match route {
            Route::Passthrough => return Ok(FetchOutcome::Passthrough),
            Route::Navigation => self.navigation(request).await?,
            Route::StaticAsset => self.cache_first(request).await?,
            Route::Default => self.cache_then_network(request).await?,
        };
        Ok(FetchOutcome::Respond(response))
    }

    /// Cache first ignoring the query, then network, then the offline document
    pub async fn navigation(&self, request: &AgentRequest) -> AgentResult<AgentResponse> {
        let namespace = &self.config.cache_version;
        if let Some(cached) = self
            .caches
            .match_in(namespace, &request.url, MatchOptions::ignore_search())
            .await?
        {
            return Ok(cached);
        }

        match self.network.fetch(request).await {
            Ok(res) => {
                self.store(request, &res).await;
                Ok(res)
            }
            Err(err) => {
                warn!(url = %request.url, error = %err, "navigation offline");
                self.offline_fallback().await
            }
        }
    }

    /// Cache first with the configured matching, then network
    ///
    /// A network failure with nothing cached is returned as an error.
    pub async fn cache_first(&self, request: &AgentRequest) -> AgentResult<AgentResponse> {
        let options = MatchOptions {
            ignore_search: self.config.asset_match.ignore_search(),
        };
        if let Some(cached) = self
            .caches
            .match_in(&self.config.cache_version, &request.url, options)
            .await?
        {
            return Ok(cached);
        }

        let res = self.network.fetch(request).await?;
        self.store(request, &res).await;
        Ok(res)
    }

    /// Any namespace ignoring the query, then network without caching
    pub async fn cache_then_network(&self, request: &AgentRequest) -> AgentResult<AgentResponse> {
        if let Some(cached) = self
            .caches
            .match_any(&request.url, MatchOptions::ignore_search())
            .await?
        {
            return Ok(cached);
        }
        self.network.fetch(request).await
    }

    async fn offline_fallback(&self) -> AgentResult<AgentResponse> {
        let document = self
            .scope
            .join(&self.config.offline_document)
            .map_err(|e| AgentError::Config(format!("offline document: {}", e)))?;
        let cached = self
            .caches
            .match_in(&self.config.cache_version, &document, MatchOptions::exact())
            .await?;
        Ok(cached.unwrap_or_else(AgentResponse::offline_placeholder))
    }

    /// Keep a successful same-origin response for next time
    async fn store(&self, request: &AgentRequest, response: &AgentResponse) {
        if !response.ok() || !is_same_origin(&request.url, self.scope) {
            return;
        }
        if let Err(err) = self
            .caches
            .put(&self.config.cache_version, &request.url, response)
            .await
        {
            warn!(url = %request.url, error = %err, "runtime cache put failed");
        }
    }
}
