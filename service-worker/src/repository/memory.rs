//! In-memory cache storage

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::Mutex;

use super::traits::{cache_key, CacheStorage, MatchOptions};
use crate::domain::{AgentResponse, AgentResult};

#[derive(Debug, Clone)]
struct Entry {
    url: Url,
    response: AgentResponse,
}

#[derive(Debug, Default)]
struct Namespace {
    name: String,
    entries: Vec<Entry>,
}

impl Namespace {
    fn insert(&mut self, url: &Url, response: &AgentResponse) {
        let key = cache_key(url, MatchOptions::exact());
        let entry = Entry {
            url: url.clone(),
            response: response.clone(),
        };
        match self
            .entries
            .iter_mut()
            .find(|e| cache_key(&e.url, MatchOptions::exact()) == key)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    fn lookup(&self, url: &Url, options: MatchOptions) -> Option<AgentResponse> {
        let wanted = cache_key(url, options);
        self.entries
            .iter()
            .find(|e| cache_key(&e.url, options) == wanted)
            .map(|e| e.response.clone())
    }
}

/// Cache storage kept in process memory; namespaces in creation order
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    namespaces: Mutex<Vec<Namespace>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a namespace, `None` if it does not exist
    pub async fn len(&self, namespace: &str) -> Option<usize> {
        let namespaces = self.namespaces.lock().await;
        namespaces
            .iter()
            .find(|n| n.name == namespace)
            .map(|n| n.entries.len())
    }
}

fn namespace_mut<'a>(namespaces: &'a mut Vec<Namespace>, name: &str) -> &'a mut Namespace {
    match namespaces.iter().position(|n| n.name == name) {
        Some(index) => &mut namespaces[index],
        None => {
            namespaces.push(Namespace {
                name: name.to_string(),
                entries: Vec::new(),
            });
            let last = namespaces.len() - 1;
            &mut namespaces[last]
        }
    }
}

#[async_trait(?Send)]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> AgentResult<Vec<String>> {
        let namespaces = self.namespaces.lock().await;
        Ok(namespaces.iter().map(|n| n.name.clone()).collect())
    }

    async fn has(&self, namespace: &str) -> AgentResult<bool> {
        let namespaces = self.namespaces.lock().await;
        Ok(namespaces.iter().any(|n| n.name == namespace))
    }

    async fn delete(&self, namespace: &str) -> AgentResult<bool> {
        let mut namespaces = self.namespaces.lock().await;
        let before = namespaces.len();
        namespaces.retain(|n| n.name != namespace);
        Ok(namespaces.len() != before)
    }

    async fn put(&self, namespace: &str, url: &Url, response: &AgentResponse) -> AgentResult<()> {
        let mut namespaces = self.namespaces.lock().await;
        namespace_mut(&mut namespaces, namespace).insert(url, response);
        Ok(())
    }

    async fn put_all(&self, namespace: &str, entries: &[(Url, AgentResponse)]) -> AgentResult<()> {
        let mut namespaces = self.namespaces.lock().await;
        let target = namespace_mut(&mut namespaces, namespace);
        for (url, response) in entries {
            target.insert(url, response);
        }
        Ok(())
    }

    async fn match_in(
        &self,
        namespace: &str,
        url: &Url,
        options: MatchOptions,
    ) -> AgentResult<Option<AgentResponse>> {
        let namespaces = self.namespaces.lock().await;
        Ok(namespaces
            .iter()
            .find(|n| n.name == namespace)
            .and_then(|n| n.lookup(url, options)))
    }

    async fn match_any(&self, url: &Url, options: MatchOptions) -> AgentResult<Option<AgentResponse>> {
        let namespaces = self.namespaces.lock().await;
        Ok(namespaces.iter().find_map(|n| n.lookup(url, options)))
    }
}
