//! Install and Activate Steps

use reqwest::Url;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::domain::{AgentError, AgentRequest, AgentResponse, AgentResult};
use crate::network::Fetcher;
use crate::repository::CacheStorage;

/// Fetch the whole manifest, then store it under the version's namespace
///
/// Every asset is fetched before anything is written, so a failed install
/// leaves no partial namespace behind. Returns the number of entries stored.
pub async fn precache<C: CacheStorage, F: Fetcher>(
    caches: &C,
    network: &F,
    config: &AgentConfig,
    scope: &Url,
) -> AgentResult<usize> {
    let mut entries: Vec<(Url, AgentResponse)> = Vec::with_capacity(config.precache.len());

    for path in &config.precache {
        let request = AgentRequest::get_relative(scope, path)?;
        let response = network
            .fetch(&request)
            .await
            .map_err(|e| AgentError::Precache {
                url: request.url.to_string(),
                reason: e.to_string(),
            })?;
        if !response.ok() {
            return Err(AgentError::Precache {
                url: request.url.to_string(),
                reason: format!("status {}", response.status),
            });
        }
        entries.push((request.url, response));
    }

    caches.put_all(&config.cache_version, &entries).await?;
    info!(version = %config.cache_version, entries = entries.len(), "precached");
    Ok(entries.len())
}

/// Delete every namespace except `keep`; returns the deleted names
pub async fn purge_stale<C: CacheStorage>(caches: &C, keep: &str) -> AgentResult<Vec<String>> {
    let mut deleted = Vec::new();
    for name in caches.keys().await? {
        if name == keep {
            continue;
        }
        if caches.delete(&name).await? {
            deleted.push(name);
        } else {
            warn!(namespace = %name, "namespace vanished before delete");
        }
    }
    if !deleted.is_empty() {
        info!(kept = %keep, deleted = ?deleted, "purged old caches");
    }
    Ok(deleted)
}
