//! Network abstraction for testability.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

/// What a request is for, as far as fallback decisions care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// A top-level page load.
    Document,
    /// An image resource.
    Image,
    /// A script resource.
    Script,
    /// A stylesheet.
    Style,
    /// A web font.
    Font,
    /// Anything else (fetch/XHR, manifests, JSON).
    #[default]
    Other,
}

/// An outgoing request as seen by the cache controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method, upper case.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Whether this is a navigation (HTML page load).
    pub navigate: bool,
    /// What the response will be used for.
    pub destination: Destination,
}

impl Request {
    /// Creates a plain `GET` sub-resource request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            navigate: false,
            destination: Destination::Other,
        }
    }

    /// Creates a `GET` navigation request.
    #[must_use]
    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            navigate: true,
            destination: Destination::Document,
            ..Self::get(url)
        }
    }

    /// Sets the request destination.
    #[must_use]
    pub const fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Sets the request method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    /// Request identity used as the cache key: method plus URL.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// HTTP reason phrase.
    pub status_text: String,
    /// Response headers, names lower case.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with the given status and body and no headers.
    #[must_use]
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Looks up a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Capability interface over the network.
///
/// Components receive this instead of reaching for a global client, so tests
/// can drive online/offline transitions deterministically.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs a request and buffers the response.
    async fn fetch(&self, request: &Request) -> Result<Response>;

    /// Posts a multipart form to `url` with `Accept: application/json`.
    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<Response>;

    /// Whether the client currently reports itself online.
    fn is_online(&self) -> bool;
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        (**self).fetch(request).await
    }

    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<Response> {
        (**self).post_form(url, fields).await
    }

    fn is_online(&self) -> bool {
        (**self).is_online()
    }
}

/// Default network implementation using `reqwest`.
///
/// Connectivity is reported through a flag that the embedding process flips
/// when the platform signals a change.
#[derive(Debug, Clone)]
pub struct ReqwestNetwork {
    client: reqwest::Client,
    online: Arc<AtomicBool>,
}

impl Default for ReqwestNetwork {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl ReqwestNetwork {
    /// Creates a network backed by the given client, initially online.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Records a connectivity change.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    async fn buffer(response: reqwest::Response) -> Result<Response> {
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;
        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl Network for ReqwestNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::Cache(format!("invalid method {}: {e}", request.method)))?;
        let response = self.client.request(method, &request.url).send().await?;
        Self::buffer(response).await
    }

    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<Response> {
        let form = fields
            .iter()
            .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            });
        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await?;
        Self::buffer(response).await
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_method_and_url() {
        let req = Request::get("https://vuanh.example/css/style.css");
        assert_eq!(req.cache_key(), "GET https://vuanh.example/css/style.css");
        let post = req.with_method("post");
        assert_eq!(post.cache_key(), "POST https://vuanh.example/css/style.css");
    }

    #[test]
    fn navigate_request_is_document() {
        let req = Request::navigate("https://vuanh.example/");
        assert!(req.navigate);
        assert_eq!(req.destination, Destination::Document);
        assert_eq!(req.method, "GET");
    }

    #[test]
    fn response_ok_range() {
        assert!(Response::new(200, "OK", "").ok());
        assert!(Response::new(204, "No Content", "").ok());
        assert!(!Response::new(304, "Not Modified", "").ok());
        assert!(!Response::new(503, "Service Unavailable", "").ok());
    }

    #[test]
    fn response_header_lookup_ignores_case() {
        let resp = Response::new(200, "OK", "").with_header("Content-Type", "text/html");
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.header("CONTENT-TYPE"), Some("text/html"));
        assert_eq!(resp.header("etag"), None);
    }

    #[test]
    fn reqwest_network_online_flag() {
        let net = ReqwestNetwork::default();
        assert!(net.is_online());
        net.set_online(false);
        assert!(!net.is_online());
        net.set_online(true);
        assert!(net.is_online());
    }
}
