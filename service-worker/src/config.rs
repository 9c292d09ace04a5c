//! Agent Configuration
//!
//! Cache version, precache manifest and routing knobs. Bump
//! `cache_version` whenever any manifest file changes.

use serde::{Deserialize, Serialize};

use crate::domain::{AgentError, AgentResult};

/// How static assets are looked up in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AssetMatch {
    /// Ignore the query string; for assets not versioned by URL
    #[default]
    IgnoreSearch,
    /// Match the full URL; required once assets carry a `?v=` parameter
    Exact,
}

impl AssetMatch {
    pub fn ignore_search(&self) -> bool {
        matches!(self, AssetMatch::IgnoreSearch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name of this version's cache namespace
    pub cache_version: String,
    /// Paths, relative to the scope, that must be available offline
    pub precache: Vec<String>,
    /// Document served for navigations when offline
    pub offline_document: String,
    pub asset_match: AssetMatch,
    /// Activate right after installing instead of waiting
    pub skip_waiting: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let precache = [
            // HTML
            "./",
            "./index.html",
            "./Ranger.html",
            "./Wingdiver.html",
            "./AirRaider.html",
            "./Fencer.html",
            // CSS
            "./Main.css",
            "./edf.css",
            // JS and wasm
            "./edf_tracker.js",
            "./edf_tracker_bg.wasm",
            // PWA
            "./manifest.webmanifest",
            // Fonts / Media
            "./perfect-future.ttf",
            "./EDF_Logo.gif",
            // Icons
            "./icon-192.png",
            "./icon-512.png",
            "./icon-180.png",
        ];
        Self {
            cache_version: "edf-precache-v16".to_string(),
            precache: precache.iter().map(|p| p.to_string()).collect(),
            offline_document: "./index.html".to_string(),
            asset_match: AssetMatch::default(),
            skip_waiting: true,
        }
    }
}

impl AgentConfig {
    /// Load from JSON; absent fields take their defaults
    pub fn from_json(raw: &str) -> AgentResult<Self> {
        let config: AgentConfig =
            serde_json::from_str(raw).map_err(|e| AgentError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.cache_version.trim().is_empty() {
            return Err(AgentError::Config("cache_version is empty".to_string()));
        }
        if self.offline_document.trim().is_empty() {
            return Err(AgentError::Config("offline_document is empty".to_string()));
        }
        Ok(())
    }

    /// Same settings under another version name
    pub fn with_version(mut self, version: &str) -> Self {
        self.cache_version = version.to_string();
        self
    }

    pub fn with_precache(mut self, paths: &[&str]) -> Self {
        self.precache = paths.iter().map(|p| p.to_string()).collect();
        self
    }
}
