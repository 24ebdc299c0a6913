//! Transport trait definition.
//!
//! Every HTTP exchange the crate makes (token grants, cloud metadata
//! discovery, ARM calls and long-running operation polling) goes through a
//! [`Transport`]. The production implementation wraps `reqwest`; tests use the
//! in-memory ARM emulation in [`transports::mock`](crate::transports).

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `PUT`
    Put,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
}

impl Method {
    /// Returns true for methods that change remote state.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Put | Self::Post | Self::Patch | Self::Delete)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Put => write!(f, "PUT"),
            Self::Post => write!(f, "POST"),
            Self::Patch => write!(f, "PATCH"),
            Self::Delete => write!(f, "DELETE"),
            Self::Head => write!(f, "HEAD"),
        }
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// No body
    Empty,
    /// `application/json`
    Json(Value),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

/// An outgoing request against an absolute URL.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute URL including query string
    pub url: String,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// Body
    pub body: Body,
}

impl Request {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    /// Sets a form body.
    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = Body::Form(pairs);
        self
    }

    /// Looks up a header case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Headers, keys lowercased
    pub headers: HashMap<String, String>,
    /// Parsed JSON body; non-JSON bodies are carried as a string value
    pub body: Option<Value>,
}

impl Response {
    /// Creates a response with a JSON body.
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Some(body),
        }
    }

    /// Creates a response without a body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Looks up a header case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Transport represents the HTTP layer beneath the management clients.
///
/// Implementations must be `Send + Sync`; a single transport is shared by
/// every client a [`ClientFactory`](crate::factory::ClientFactory) creates.
///
/// A transport returns `Ok` for every response it receives, whatever the
/// status. `Err` means no response was obtained at all.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the transport name (e.g., "http", "mock").
    fn name(&self) -> &str;

    /// Sends one request and returns the response.
    async fn send(&self, request: Request) -> Result<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let req = Request::new(Method::Put, "https://management.azure.com/x")
            .header("Authorization", "Bearer t")
            .json(json!({"location": "eastus"}));

        assert_eq!(req.header_value("authorization"), Some("Bearer t"));
        assert!(matches!(req.body, Body::Json(_)));
        assert!(req.method.is_mutating());
        assert!(!Method::Get.is_mutating());
    }

    #[test]
    fn test_response_headers_are_case_insensitive() {
        let resp = Response::empty(202).with_header("Azure-AsyncOperation", "https://op");
        assert_eq!(resp.header("azure-asyncoperation"), Some("https://op"));
        assert!(resp.is_success());
        assert!(!Response::empty(404).is_success());
    }
}
