//! Repository Layer - Cache Storage Trait
//!
//! Abstract interface over versioned cache namespaces.
//! Implementations can use the browser Cache API, in-memory maps, etc.

use async_trait::async_trait;
use reqwest::Url;

use crate::domain::{AgentResponse, AgentResult};

/// How a stored entry is matched against a request URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchOptions {
    /// Compare URLs without their query string
    pub ignore_search: bool,
}

impl MatchOptions {
    pub fn exact() -> Self {
        Self { ignore_search: false }
    }

    pub fn ignore_search() -> Self {
        Self { ignore_search: true }
    }
}

/// Named cache namespaces of stored responses
///
/// Each put, match and delete is atomic on its own; nothing is atomic
/// across calls except [`put_all`](CacheStorage::put_all).
#[async_trait(?Send)]
pub trait CacheStorage {
    /// Names of every existing namespace
    async fn keys(&self) -> AgentResult<Vec<String>>;

    async fn has(&self, namespace: &str) -> AgentResult<bool>;

    /// Delete a namespace; `false` when it did not exist
    async fn delete(&self, namespace: &str) -> AgentResult<bool>;

    /// Store one response, creating the namespace if needed
    async fn put(&self, namespace: &str, url: &Url, response: &AgentResponse) -> AgentResult<()>;

    /// Store several responses in one step
    async fn put_all(&self, namespace: &str, entries: &[(Url, AgentResponse)]) -> AgentResult<()>;

    /// Look up a response in one namespace
    async fn match_in(
        &self,
        namespace: &str,
        url: &Url,
        options: MatchOptions,
    ) -> AgentResult<Option<AgentResponse>>;

    /// Look up a response in every namespace, oldest namespace first
    async fn match_any(&self, url: &Url, options: MatchOptions) -> AgentResult<Option<AgentResponse>>;
}

/// Cache key of a URL: fragments never take part in matching
pub fn cache_key(url: &Url, options: MatchOptions) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    if options.ignore_search {
        key.set_query(None);
    }
    key.to_string()
}
