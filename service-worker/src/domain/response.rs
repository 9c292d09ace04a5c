//! Agent Response
//!
//! A response as fetched from the network or read back from a cache
//! namespace. Outside the browser it is fully buffered; inside a service
//! worker it also carries the browser's own response, which is forwarded
//! untouched.

use reqwest::Url;

/// The browser response behind an [`AgentResponse`]
#[cfg(target_arch = "wasm32")]
pub type NativeResponse = web_sys::Response;

/// Never present outside the browser
#[cfg(not(target_arch = "wasm32"))]
pub type NativeResponse = std::convert::Infallible;

/// Body of the placeholder served when offline with no cached document
pub const OFFLINE_PLACEHOLDER_HTML: &str = "<h1>Offline</h1><p>Please reconnect.</p>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub status: u16,
    /// Final URL, `None` for synthesized responses
    pub url: Option<Url>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Browser response to hand back as-is; opaque responses have no
    /// readable status, headers or body
    pub native: Option<NativeResponse>,
}

impl AgentResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            url: None,
            headers: Vec::new(),
            body: body.into(),
            native: None,
        }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Minimal page shown when offline and nothing better is cached
    pub fn offline_placeholder() -> Self {
        Self::new(200, OFFLINE_PLACEHOLDER_HTML).with_header("Content-Type", "text/html; charset=utf-8")
    }

    /// Statuses whose responses must not carry a body
    pub fn is_null_body_status(&self) -> bool {
        matches!(self.status, 101 | 103 | 204 | 205 | 304)
    }

    /// 2xx status
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
