//! Intercepted Request
//!
//! The parts of an intercepted request the routing strategies look at.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::error::{AgentError, AgentResult};

/// How the request was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Address bar, link taps, home-screen launches
    Navigate,
    SameOrigin,
    #[default]
    NoCors,
    Cors,
}

/// What the response will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// `fetch()` and XHR calls
    #[default]
    Empty,
    Document,
    Style,
    Script,
    Font,
    Image,
    Manifest,
    Other,
}

impl Destination {
    pub fn from_str(s: &str) -> Self {
        match s {
            "" => Destination::Empty,
            "document" => Destination::Document,
            "style" => Destination::Style,
            "script" => Destination::Script,
            "font" => Destination::Font,
            "image" => Destination::Image,
            "manifest" => Destination::Manifest,
            _ => Destination::Other,
        }
    }

    /// Static subresource classes served cache-first
    pub fn is_static_asset(&self) -> bool {
        matches!(
            self,
            Destination::Style | Destination::Script | Destination::Font | Destination::Image
        )
    }
}

/// A request seen by the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    /// Value of the `Accept` header
    pub accept: Option<String>,
}

impl AgentRequest {
    /// Plain `GET` of an absolute URL
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            mode: RequestMode::default(),
            destination: Destination::default(),
            accept: None,
        }
    }

    /// `GET` of `path` resolved against `base`
    pub fn get_relative(base: &Url, path: &str) -> AgentResult<Self> {
        let url = base
            .join(path)
            .map_err(|e| AgentError::Config(format!("cannot resolve {}: {}", path, e)))?;
        Ok(Self::get(url))
    }

    /// Browser-initiated page load
    pub fn navigation(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            destination: Destination::Document,
            accept: Some("text/html,application/xhtml+xml".to_string()),
            ..Self::get(url)
        }
    }

    /// Subresource load with the given destination
    pub fn subresource(url: Url, destination: Destination) -> Self {
        Self {
            destination,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_string();
        self
    }

    pub fn with_accept(mut self, accept: &str) -> Self {
        self.accept = Some(accept.to_string());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Page loads, including `fetch()` calls asking for HTML
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
            || (self.destination == Destination::Empty
                && self.accept.as_deref().is_some_and(|a| a.contains("text/html")))
    }
}

/// Whether `url` shares scheme, host and port with `scope`
pub fn is_same_origin(url: &Url, scope: &Url) -> bool {
    url.origin() == scope.origin()
}
