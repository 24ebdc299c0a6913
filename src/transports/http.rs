//! HTTP transport backed by `reqwest`.

use crate::transport::{Body, Method, Request, Response, Transport};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Connect timeout for new connections. Requests themselves are not timed out.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport that sends requests over the network.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a default `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// Wraps an existing `reqwest` client (proxies, custom roots, ...).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

/// Parses a response body; non-JSON payloads are kept as a string.
fn parse_body(bytes: &[u8]) -> Option<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
    )
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, request: Request) -> Result<Response> {
        let mut builder = self.http.request(method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Form(pairs) => builder.form(pairs),
        };

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let bytes = response.bytes().await?;

        tracing::trace!(status, url = %request.url, "received response");

        Ok(Response {
            status,
            headers,
            body: parse_body(&bytes),
        })
    }
}

/// Registers the HTTP transport with the factory.
pub fn register() {
    crate::factory::register_transport("http", || Ok(Arc::new(HttpTransport::new()?)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b""), None);
        assert_eq!(parse_body(b"  \n"), None);
        assert_eq!(parse_body(br#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(
            parse_body(b"<html>bad gateway</html>"),
            Some(json!("<html>bad gateway</html>"))
        );
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(method(Method::Head), reqwest::Method::HEAD);
        assert_eq!(method(Method::Put), reqwest::Method::PUT);
    }

    #[test]
    fn test_transport_name() {
        let transport = HttpTransport::new().unwrap();
        assert_eq!(transport.name(), "http");
    }
}
