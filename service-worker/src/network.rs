//! Network Access
//!
//! The agent never talks to the network directly; every fetch goes through
//! a [`Fetcher`] so tests can script connectivity.

use async_trait::async_trait;
use reqwest::{Client, Method};

use crate::domain::{AgentError, AgentRequest, AgentResponse, AgentResult};

#[async_trait(?Send)]
pub trait Fetcher {
    /// Perform the request; transport failures are `AgentError::Network`,
    /// HTTP error statuses are returned as responses
    async fn fetch(&self, request: &AgentRequest) -> AgentResult<AgentResponse>;
}

/// Fetcher backed by a `reqwest` client, for hosts outside a service worker
///
/// Sends only method, URL and `Accept`; the response is fully buffered.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait(?Send)]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &AgentRequest) -> AgentResult<AgentResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| AgentError::Network(format!("bad method {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, request.url.clone());
        if let Some(accept) = &request.accept {
            builder = builder.header("Accept", accept.as_str());
        }

        let res = builder
            .send()
            .await
            .map_err(|e| AgentError::Network(format!("{}: {}", request.url, e)))?;

        let status = res.status().as_u16();
        let url = res.url().clone();
        let headers = res
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = res
            .bytes()
            .await
            .map_err(|e| AgentError::Network(format!("{}: {}", request.url, e)))?;

        Ok(AgentResponse {
            status,
            url: Some(url),
            headers,
            body: body.to_vec(),
            native: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fetcher() -> ReqwestFetcher {
        let client = Client::builder().no_proxy().build().expect("client");
        ReqwestFetcher::with_client(client)
    }

    /// Serve one canned HTTP response on a local port
    async fn serve_once(reply: &'static [u8]) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            socket.write_all(reply).await.unwrap();
            let _ = socket.shutdown().await;
        });
        Url::parse(&format!("http://{}/a.css", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_reads_status_headers_and_body() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/css\r\nContent-Length: 4\r\nConnection: close\r\n\r\na {}",
        )
        .await;

        let res = fetcher().fetch(&AgentRequest::get(url.clone())).await.unwrap();

        assert_eq!(res.status, 200);
        assert_eq!(res.header("content-type"), Some("text/css"));
        assert_eq!(res.text(), "a {}");
        assert_eq!(res.url, Some(url));
        assert!(res.native.is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let url = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;

        let res = fetcher().fetch(&AgentRequest::get(url)).await.unwrap();

        assert_eq!(res.status, 404);
        assert!(!res.ok());
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{}/", addr)).unwrap();

        let result = fetcher().fetch(&AgentRequest::get(url)).await;

        assert!(matches!(result, Err(AgentError::Network(_))));
    }

    #[tokio::test]
    async fn test_rejects_bad_method() {
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let req = AgentRequest::get(url).with_method("BAD METHOD");

        assert!(matches!(fetcher().fetch(&req).await, Err(AgentError::Network(_))));
    }
}
