//! Mock transport for testing.
//!
//! This transport provides an in-memory Azure Resource Manager with error
//! injection, pagination and long-running deletes, plus the token and
//! metadata endpoints the client stack talks to before it reaches ARM.

use crate::transport::{Method, Request, Response, Transport};
use crate::{CloudError, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

/// Token the mock hands out and expects back.
const MOCK_TOKEN: &str = "mock-access-token";

/// Subscription seeded into every mock.
pub const MOCK_SUBSCRIPTION_ID: &str = "00000000-0000-0000-0000-000000000000";

/// VM sizes returned for any existing availability set.
const VM_SIZES: &[(&str, u32, u32)] = &[
    ("Standard_B1s", 1, 1024),
    ("Standard_D2s_v3", 2, 8192),
    ("Standard_D4s_v3", 4, 16384),
];

struct PendingDelete {
    target: String,
    remaining: u32,
}

/// Mock transport for testing.
///
/// Resources are keyed by their lowercased ARM path. Writes fill in `id`,
/// `name`, `type` and `properties.provisioningState` the way ARM does.
///
/// # Example
///
/// ```
/// use azurerm_state::transports::mock::MockTransport;
/// use azurerm_state::factory::{ClientFactory, ClientType};
/// use azurerm_state::{CloudError, Profile};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> azurerm_state::Result<()> {
///     let mut mock = MockTransport::new();
///
///     // Test error conditions
///     mock.put_error = Some(CloudError::new(Some(409), "Conflict", "busy"));
///
///     let factory = ClientFactory::new(Arc::new(mock));
///     let client = factory.client(&Profile::new("sub"), ClientType::Resource).await?;
///     let result = client
///         .put("/subscriptions/sub/resourcegroups/g", "2019-10-01", serde_json::json!({}))
///         .await;
///     assert!(result.is_err());
///
///     Ok(())
/// }
/// ```
pub struct MockTransport {
    resources: RwLock<BTreeMap<String, Value>>,
    operations: RwLock<HashMap<String, PendingDelete>>,
    requests: RwLock<Vec<Request>>,
    scripted: RwLock<Vec<(Method, String, Response)>>,
    page_size: Option<usize>,
    async_delete_polls: Option<u32>,

    /// Error description returned by the token endpoints
    pub token_error: Option<String>,
    /// Error to return from GET on a resource or collection
    pub get_error: Option<CloudError>,
    /// Error to return from PUT
    pub put_error: Option<CloudError>,
    /// Error to return from DELETE
    pub delete_error: Option<CloudError>,
}

impl MockTransport {
    /// Creates a mock holding one subscription and no resources.
    pub fn new() -> Self {
        let mut resources = BTreeMap::new();
        let path = format!("/subscriptions/{}", MOCK_SUBSCRIPTION_ID);
        resources.insert(
            path.to_lowercase(),
            json!({
                "id": path,
                "subscriptionId": MOCK_SUBSCRIPTION_ID,
                "displayName": "Mock Subscription",
                "state": "Enabled"
            }),
        );

        Self {
            resources: RwLock::new(resources),
            operations: RwLock::new(HashMap::new()),
            requests: RwLock::new(Vec::new()),
            scripted: RwLock::new(Vec::new()),
            page_size: None,
            async_delete_polls: None,
            token_error: None,
            get_error: None,
            put_error: None,
            delete_error: None,
        }
    }

    /// Splits collection responses into pages of `size` items linked by
    /// `nextLink`.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Answers DELETE with `202 Accepted` and an `Azure-AsyncOperation`
    /// that reports success on the `polls`-th status check.
    pub fn with_async_deletes(mut self, polls: u32) -> Self {
        self.async_delete_polls = Some(polls.max(1));
        self
    }

    /// Pre-populates the store with a resource at `path`.
    ///
    /// Useful for setting up test fixtures.
    pub async fn set_resource(&self, path: &str, body: Value) {
        let stored = stamp(path, body);
        let mut resources = self.resources.write().await;
        resources.insert(key_of(path), stored);
    }

    /// Queues a canned response for the next `method` request whose URL
    /// contains `url_fragment`. Queued responses are served first-in
    /// first-out and bypass the store.
    pub async fn script(&self, method: Method, url_fragment: &str, response: Response) {
        let mut scripted = self.scripted.write().await;
        scripted.push((method, url_fragment.to_lowercase(), response));
    }

    async fn next_scripted(&self, request: &Request) -> Option<Response> {
        let url = request.url.to_lowercase();
        let mut scripted = self.scripted.write().await;
        let at = scripted
            .iter()
            .position(|(method, fragment, _)| *method == request.method && url.contains(fragment))?;
        Some(scripted.remove(at).2)
    }

    /// Returns the stored resource at `path`.
    pub async fn resource(&self, path: &str) -> Option<Value> {
        let resources = self.resources.read().await;
        resources.get(&key_of(path)).cloned()
    }

    /// Returns every request received so far.
    pub async fn requests(&self) -> Vec<Request> {
        self.requests.read().await.clone()
    }

    /// Counts state-changing ARM requests (token grants excluded).
    pub async fn mutation_count(&self) -> usize {
        self.requests
            .read()
            .await
            .iter()
            .filter(|r| r.method.is_mutating() && !r.url.contains("/oauth2/"))
            .count()
    }

    fn token_response(&self, expires_in: Value, status_on_error: u16) -> Response {
        match &self.token_error {
            Some(description) => Response::json(
                status_on_error,
                json!({"error": "invalid_client", "error_description": description}),
            ),
            None => Response::json(
                200,
                json!({
                    "token_type": "Bearer",
                    "access_token": MOCK_TOKEN,
                    "expires_in": expires_in
                }),
            ),
        }
    }

    async fn arm(&self, request: &Request, url: &Url) -> Response {
        let authorized = request
            .header_value("authorization")
            .is_some_and(|v| v == format!("Bearer {}", MOCK_TOKEN));
        if !authorized {
            return error_response(&CloudError::new(
                Some(401),
                "AuthenticationFailed",
                "Authentication failed. The 'Authorization' header is missing or invalid.",
            ));
        }

        let path = url.path().trim_end_matches('/');
        let key = path.to_lowercase();

        if key.contains("/operations/") && request.method == Method::Get {
            return self.poll_operation(&key).await;
        }

        match request.method {
            Method::Get if key.ends_with("/vmsizes") => self.vm_sizes(&key).await,
            Method::Get => {
                if let Some(err) = &self.get_error {
                    return error_response(err);
                }
                if is_collection(&key) {
                    self.list(&key, url).await
                } else {
                    self.get(&key).await
                }
            }
            Method::Head => {
                let resources = self.resources.read().await;
                if resources.contains_key(&key) {
                    Response::empty(204)
                } else {
                    Response::empty(404)
                }
            }
            Method::Put => {
                if let Some(err) = &self.put_error {
                    return error_response(err);
                }
                let body = match &request.body {
                    crate::transport::Body::Json(v) => v.clone(),
                    _ => json!({}),
                };
                self.put(path, &key, body).await
            }
            Method::Delete => {
                if let Some(err) = &self.delete_error {
                    return error_response(err);
                }
                self.delete(&key, url).await
            }
            Method::Post | Method::Patch => error_response(&CloudError::new(
                Some(405),
                "MethodNotAllowed",
                format!("{} is not supported by the mock", request.method),
            )),
        }
    }

    async fn get(&self, key: &str) -> Response {
        let resources = self.resources.read().await;
        match resources.get(key) {
            Some(body) => Response::json(200, body.clone()),
            None => error_response(&not_found(key)),
        }
    }

    async fn list(&self, key: &str, url: &Url) -> Response {
        let items: Vec<Value> = {
            let resources = self.resources.read().await;
            resources
                .iter()
                .filter(|(k, _)| in_collection(k, key))
                .map(|(_, v)| v.clone())
                .collect()
        };

        let size = match self.page_size {
            Some(size) => size,
            None => return Response::json(200, json!({ "value": items })),
        };

        let skip = url
            .query_pairs()
            .find(|(k, _)| k == "$skiptoken")
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        let page: Vec<Value> = items.iter().skip(skip).take(size).cloned().collect();

        let mut body = json!({ "value": page });
        if skip + size < items.len() {
            let mut next = url.clone();
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "$skiptoken")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            next.query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair("$skiptoken", &(skip + size).to_string());
            body["nextLink"] = Value::String(next.to_string());
        }
        Response::json(200, body)
    }

    async fn put(&self, path: &str, key: &str, body: Value) -> Response {
        let mut resources = self.resources.write().await;

        if let Some(group) = group_key(key) {
            if group != key && !resources.contains_key(&group) {
                let name = group.rsplit('/').next().unwrap_or_default();
                return error_response(&CloudError::new(
                    Some(404),
                    "ResourceGroupNotFound",
                    format!("Resource group '{}' could not be found.", name),
                ));
            }
        }

        let stored = stamp(path, body);
        let status = if resources.contains_key(key) { 200 } else { 201 };
        resources.insert(key.to_string(), stored.clone());
        Response::json(status, stored)
    }

    async fn delete(&self, key: &str, url: &Url) -> Response {
        {
            let resources = self.resources.read().await;
            if !resources.contains_key(key) {
                return Response::empty(204);
            }
        }

        match self.async_delete_polls {
            Some(polls) => {
                let id = Uuid::new_v4().to_string();
                let mut operations = self.operations.write().await;
                operations.insert(
                    id.clone(),
                    PendingDelete {
                        target: key.to_string(),
                        remaining: polls,
                    },
                );

                let sub = key.split('/').nth(2).unwrap_or(MOCK_SUBSCRIPTION_ID);
                let operation = format!(
                    "{}://{}/subscriptions/{}/providers/Microsoft.Mock/operations/{}?api-version=2019-10-01",
                    url.scheme(),
                    url.host_str().unwrap_or("localhost"),
                    sub,
                    id
                );
                Response::empty(202)
                    .with_header("Azure-AsyncOperation", operation)
                    .with_header("Retry-After", "0")
            }
            None => {
                remove_tree(&mut *self.resources.write().await, key);
                Response::empty(200)
            }
        }
    }

    async fn poll_operation(&self, key: &str) -> Response {
        let id = key.rsplit('/').next().unwrap_or_default();
        let mut operations = self.operations.write().await;

        let finished = match operations.get_mut(id) {
            Some(op) => {
                op.remaining = op.remaining.saturating_sub(1);
                op.remaining == 0
            }
            None => return error_response(&not_found(key)),
        };

        if !finished {
            return Response::json(200, json!({"status": "InProgress"})).with_header("Retry-After", "0");
        }

        if let Some(op) = operations.remove(id) {
            remove_tree(&mut *self.resources.write().await, &op.target);
        }
        Response::json(200, json!({"status": "Succeeded"}))
    }

    async fn vm_sizes(&self, key: &str) -> Response {
        let parent = key.trim_end_matches("/vmsizes");
        let resources = self.resources.read().await;
        if !resources.contains_key(parent) {
            return error_response(&not_found(parent));
        }

        let sizes: Vec<Value> = VM_SIZES
            .iter()
            .map(|(name, cores, memory)| {
                json!({
                    "name": name,
                    "numberOfCores": cores,
                    "memoryInMB": memory,
                    "maxDataDiskCount": cores * 4,
                    "osDiskSizeInMB": 1_047_552,
                    "resourceDiskSizeInMB": memory * 4
                })
            })
            .collect();
        Response::json(200, json!({ "value": sizes }))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, request: Request) -> Result<Response> {
        self.requests.write().await.push(request.clone());

        if let Some(response) = self.next_scripted(&request).await {
            return Ok(response);
        }

        let url = Url::parse(&request.url).map_err(|e| {
            crate::AzurermError::Other(anyhow::anyhow!("invalid URL {}: {}", request.url, e))
        })?;

        if url.path().ends_with("/oauth2/v2.0/token") {
            return Ok(self.token_response(json!(3599), 401));
        }
        if url.host_str() == Some("169.254.169.254") {
            return Ok(self.token_response(json!("86399"), 400));
        }
        if url.path() == "/metadata/endpoints" {
            let host = url.host_str().unwrap_or("localhost");
            return Ok(Response::json(
                200,
                json!({
                    "authentication": {
                        "loginEndpoint": format!("https://login.{}/", host),
                        "audiences": [format!("https://{}/", host)]
                    }
                }),
            ));
        }

        Ok(self.arm(&request, &url).await)
    }
}

fn key_of(path: &str) -> String {
    path.trim_end_matches('/').to_lowercase()
}

fn error_response(err: &CloudError) -> Response {
    Response::json(
        err.status.unwrap_or(400),
        json!({"error": {"code": err.code, "message": err.message}}),
    )
}

fn not_found(key: &str) -> CloudError {
    let segments: Vec<&str> = key.trim_start_matches('/').split('/').collect();
    if segments.len() == 4 && segments[2] == "resourcegroups" {
        CloudError::new(
            Some(404),
            "ResourceGroupNotFound",
            format!("Resource group '{}' could not be found.", segments[3]),
        )
    } else {
        CloudError::new(
            Some(404),
            "ResourceNotFound",
            format!("The Resource '{}' was not found.", key),
        )
    }
}

/// Collections have an odd number of path segments; `providers/<ns>` counts
/// as a pair.
fn is_collection(key: &str) -> bool {
    key.trim_start_matches('/').split('/').count() % 2 == 1
}

fn parent_of(key: &str) -> &str {
    key.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// Drops the `resourcegroups/<g>` pair from a provider path.
fn without_group(key: &str) -> Option<String> {
    let segments: Vec<&str> = key.split('/').collect();
    let at = segments.iter().position(|s| *s == "resourcegroups")?;
    if segments.get(at + 2) != Some(&"providers") {
        return None;
    }
    let mut kept = segments[..at].to_vec();
    kept.extend_from_slice(&segments[at + 2..]);
    Some(kept.join("/"))
}

fn in_collection(item: &str, collection: &str) -> bool {
    if is_collection(item) {
        return false;
    }
    if parent_of(item) == collection {
        return true;
    }
    !collection.contains("/resourcegroups/")
        && without_group(item).is_some_and(|k| parent_of(&k) == collection)
}

/// Key of the resource group a path lives under, if any.
fn group_key(key: &str) -> Option<String> {
    let segments: Vec<&str> = key.split('/').collect();
    let at = segments.iter().position(|s| *s == "resourcegroups")?;
    segments.get(at + 1)?;
    Some(segments[..at + 2].join("/"))
}

fn remove_tree(resources: &mut BTreeMap<String, Value>, key: &str) {
    let prefix = format!("{}/", key);
    resources.retain(|k, _| k != key && !k.starts_with(&prefix));
}

/// ARM resource type for a path, e.g. `Microsoft.Compute/availabilitySets`.
fn resource_type(path: &str) -> String {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match segments.iter().position(|s| s.eq_ignore_ascii_case("providers")) {
        Some(at) => {
            let mut parts = vec![segments.get(at + 1).copied().unwrap_or_default()];
            parts.extend(segments.get(at + 2..).unwrap_or(&[]).iter().step_by(2).copied());
            parts.join("/")
        }
        None if segments.len() == 4 => "Microsoft.Resources/resourceGroups".to_string(),
        None => "Microsoft.Resources/subscriptions".to_string(),
    }
}

/// Fills in the server-populated fields ARM adds on write.
fn stamp(path: &str, body: Value) -> Value {
    let mut object = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let name = path.rsplit('/').next().unwrap_or_default();

    object.insert("id".to_string(), Value::String(path.to_string()));
    object.insert("name".to_string(), Value::String(name.to_string()));
    object.insert("type".to_string(), Value::String(resource_type(path)));

    let properties = object
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(props) = properties {
        props.insert(
            "provisioningState".to_string(),
            Value::String("Succeeded".to_string()),
        );
    }

    Value::Object(object)
}

/// Registers the mock transport with the factory.
pub fn register() {
    crate::factory::register_transport("mock", || Ok(Arc::new(MockTransport::new())));
}
