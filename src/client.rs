//! Authenticated Resource Manager client.
//!
//! A [`ManagementClient`] wraps a shared [`Transport`] with a credential, the
//! resolved cloud endpoints and a token cache. It speaks raw ARM: paths in,
//! JSON out. Non-success responses become [`CloudError`]s; long-running
//! operations are polled to completion.

use crate::cloud::Endpoints;
use crate::credential::Credential;
use crate::factory::{ClientType, DEFAULT_POLL_INTERVAL};
use crate::pager::Pager;
use crate::session::SessionCache;
use crate::transport::{Method, Request, Response, Transport};
use crate::{CloudError, ExecError, ExecResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A management-plane client bound to one credential and (usually) one
/// subscription.
pub struct ManagementClient {
    transport: Arc<dyn Transport>,
    credential: Credential,
    endpoints: Endpoints,
    client_type: ClientType,
    subscription_id: Option<String>,
    sessions: SessionCache,
    user_agent: String,
    poll_interval: Duration,
}

impl std::fmt::Debug for ManagementClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementClient")
            .field("client_type", &self.client_type)
            .field("credential", &self.credential)
            .field("cloud", &self.endpoints.name)
            .field("subscription_id", &self.subscription_id)
            .finish_non_exhaustive()
    }
}

impl ManagementClient {
    /// Creates a client. Most callers go through
    /// [`ClientFactory::client`](crate::factory::ClientFactory::client).
    pub fn new(
        transport: Arc<dyn Transport>,
        credential: Credential,
        endpoints: Endpoints,
        client_type: ClientType,
        subscription_id: Option<String>,
    ) -> Self {
        Self {
            transport,
            credential,
            endpoints,
            client_type,
            subscription_id,
            sessions: SessionCache::new(),
            user_agent: format!("azurerm-state/{}", env!("CARGO_PKG_VERSION")),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the fallback long-running operation poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns the bound subscription id; `None` for subscription clients.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    /// Returns the bound subscription id or a validation error for
    /// unbound clients.
    pub fn require_subscription(&self) -> Result<&str, CloudError> {
        self.subscription_id()
            .ok_or_else(|| CloudError::validation("the client is not bound to a subscription"))
    }

    /// Returns the client family.
    pub fn client_type(&self) -> ClientType {
        self.client_type
    }

    /// Returns the cloud endpoints.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Builds the absolute URL for an ARM path and API version.
    pub fn url(&self, path: &str, api_version: &str) -> String {
        let separator = if path.contains('?') { '&' } else { '?' };
        format!(
            "{}{}api-version={}",
            self.endpoints.url(path),
            separator,
            api_version
        )
    }

    /// Returns a bearer token, acquiring a new one when the cached session
    /// is missing or about to expire.
    async fn bearer(&self) -> ExecResult<String> {
        if let Some(session) = self.sessions.load().await {
            return Ok(session.token().to_string());
        }

        let session = self
            .credential
            .acquire(self.transport.as_ref(), &self.endpoints)
            .await?;
        let token = session.token().to_string();
        self.sessions.save(session).await;
        Ok(token)
    }

    async fn execute(&self, method: Method, url: &str, body: Option<Value>) -> ExecResult<Response> {
        let token = self.bearer().await?;

        let mut request = Request::new(method, url)
            .header("Authorization", format!("Bearer {}", token))
            .header("User-Agent", self.user_agent.as_str())
            .header("x-ms-client-request-id", Uuid::new_v4().to_string());
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(client = %self.client_type, %method, %url, "sending request");

        self.transport
            .send(request)
            .await
            .map_err(|e| ExecError::Cloud(CloudError::new(None, "TransportError", e.to_string())))
    }

    async fn execute_checked(&self, method: Method, url: &str, body: Option<Value>) -> ExecResult<Response> {
        let response = self.execute(method, url, body).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(CloudError::from_response(response.status, response.body.as_ref()).into())
        }
    }

    /// GETs an absolute URL (used for `nextLink` and polling).
    pub async fn fetch(&self, url: &str) -> ExecResult<Value> {
        let response = self.execute_checked(Method::Get, url, None).await?;
        Ok(response.body.unwrap_or(Value::Null))
    }

    /// GETs a resource.
    pub async fn get(&self, path: &str, api_version: &str) -> ExecResult<Value> {
        self.fetch(&self.url(path, api_version)).await
    }

    /// PUTs a resource and waits for provisioning to finish.
    pub async fn put(&self, path: &str, api_version: &str, body: Value) -> ExecResult<Value> {
        let url = self.url(path, api_version);
        let response = self.execute_checked(Method::Put, &url, Some(body)).await?;
        let result = self.wait(response, Some(&url)).await?;
        Ok(result.unwrap_or(Value::Null))
    }

    /// DELETEs a resource and waits for the deletion to finish.
    pub async fn delete(&self, path: &str, api_version: &str) -> ExecResult<bool> {
        let url = self.url(path, api_version);
        let response = self.execute_checked(Method::Delete, &url, None).await?;
        self.wait(response, None).await?;
        Ok(true)
    }

    /// Checks existence with HEAD: `true` on 2xx, `false` on 404.
    pub async fn head(&self, path: &str, api_version: &str) -> ExecResult<bool> {
        let url = self.url(path, api_version);
        let response = self.execute(Method::Head, &url, None).await?;
        match response.status {
            s if (200..300).contains(&s) => Ok(true),
            404 => Ok(false),
            s => Err(CloudError::from_response(s, response.body.as_ref()).into()),
        }
    }

    /// Pages through a collection.
    pub fn pager(&self, path: &str, api_version: &str) -> Pager<'_> {
        Pager::new(self, self.url(path, api_version))
    }

    fn delay(&self, response: &Response) -> Duration {
        response
            .header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.poll_interval)
    }

    /// Polls a long-running operation until it reaches a terminal state.
    ///
    /// Any 2xx response carrying `Azure-AsyncOperation` or `Location` is
    /// polled, including `200` answers to updates. A `201` without either
    /// header is polled on the resource itself while its
    /// `provisioningState` is not terminal. Returns the final resource body
    /// when one is available. There is no timeout.
    async fn wait(&self, initial: Response, resource_url: Option<&str>) -> ExecResult<Option<Value>> {
        if let Some(operation) = initial.header("azure-asyncoperation").map(str::to_string) {
            self.poll_operation(&operation, &initial).await?;
            tracing::debug!(client = %self.client_type, "long-running operation succeeded");

            return match resource_url {
                Some(url) => self.fetch(url).await.map(Some),
                None => Ok(None),
            };
        }

        if let Some(location) = initial.header("location").map(str::to_string) {
            let last = self.poll_location(&location, initial).await?;

            return match resource_url {
                Some(url) => self.fetch(url).await.map(Some),
                None => Ok(last.body),
            };
        }

        match resource_url {
            Some(url) if initial.status == 201 && !is_terminal(initial.body.as_ref()) => {
                self.poll_resource(url, initial).await.map(Some)
            }
            _ => Ok(initial.body),
        }
    }

    async fn poll_operation(&self, operation: &str, initial: &Response) -> ExecResult<()> {
        let mut delay = self.delay(initial);
        loop {
            tokio::time::sleep(delay).await;
            let response = self.execute_checked(Method::Get, operation, None).await?;
            let status = response
                .body
                .as_ref()
                .and_then(|b| b.get("status"))
                .and_then(Value::as_str)
                .unwrap_or("InProgress")
                .to_ascii_lowercase();

            match status.as_str() {
                "succeeded" => return Ok(()),
                "failed" | "canceled" | "cancelled" => {
                    return Err(CloudError::from_response(response.status, response.body.as_ref()).into())
                }
                _ => delay = self.delay(&response),
            }
        }
    }

    async fn poll_location(&self, location: &str, initial: Response) -> ExecResult<Response> {
        let mut last = initial;
        loop {
            tokio::time::sleep(self.delay(&last)).await;
            let response = self.execute_checked(Method::Get, location, None).await?;
            if response.status != 202 {
                return Ok(response);
            }
            last = response;
        }
    }

    async fn poll_resource(&self, url: &str, initial: Response) -> ExecResult<Value> {
        let mut last = initial;
        loop {
            tokio::time::sleep(self.delay(&last)).await;
            let response = self.execute_checked(Method::Get, url, None).await?;
            match provisioning_state(response.body.as_ref()).map(str::to_ascii_lowercase).as_deref() {
                Some("failed") | Some("canceled") | Some("cancelled") => {
                    let state = provisioning_state(response.body.as_ref()).unwrap_or_default();
                    return Err(CloudError::new(
                        Some(response.status),
                        "ProvisioningFailed",
                        format!("Provisioning of the resource ended in state {}.", state),
                    )
                    .into());
                }
                Some("succeeded") | None => return Ok(response.body.unwrap_or(Value::Null)),
                Some(_) => last = response,
            }
        }
    }
}

fn provisioning_state(body: Option<&Value>) -> Option<&str> {
    let body = body?;
    body.get("properties")
        .and_then(|p| p.get("provisioningState"))
        .or_else(|| body.get("provisioningState"))
        .and_then(Value::as_str)
}

/// A missing `provisioningState` counts as terminal.
fn is_terminal(body: Option<&Value>) -> bool {
    match provisioning_state(body) {
        Some(state) => matches!(
            state.to_ascii_lowercase().as_str(),
            "succeeded" | "failed" | "canceled" | "cancelled"
        ),
        None => true,
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::cloud::public_endpoints;
    use crate::transports::mock::MockTransport;
    use crate::{AuthError, AzurermError};
    use serde_json::json;

    fn client(mock: &Arc<MockTransport>) -> ManagementClient {
        ManagementClient::new(
            Arc::clone(mock) as Arc<dyn Transport>,
            Credential::ServicePrincipal {
                client_id: "c".into(),
                secret: "s".into(),
                tenant: "t".into(),
            },
            public_endpoints(),
            ClientType::Resource,
            Some("sub".into()),
        )
        .with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_url_building() {
        let mock = Arc::new(MockTransport::new());
        let client = client(&mock);
        assert_eq!(
            client.url("/subscriptions/sub/resourcegroups/g", "2019-10-01"),
            "https://management.azure.com/subscriptions/sub/resourcegroups/g?api-version=2019-10-01"
        );
        assert!(client.url("/x?$top=5", "1").ends_with("?$top=5&api-version=1"));
    }

    #[tokio::test]
    async fn test_headers_and_token_reuse() {
        let mock = Arc::new(MockTransport::new());
        let client = client(&mock);

        client
            .put("/subscriptions/sub/resourcegroups/g", "2019-10-01", json!({"location": "eastus"}))
            .await
            .unwrap();
        client
            .get("/subscriptions/sub/resourcegroups/g", "2019-10-01")
            .await
            .unwrap();

        let requests = mock.requests().await;
        let token_requests = requests.iter().filter(|r| r.url.contains("oauth2")).count();
        assert_eq!(token_requests, 1);

        let arm = requests.iter().find(|r| r.method == Method::Get).unwrap();
        assert!(arm.header_value("user-agent").unwrap().starts_with("azurerm-state/"));
        assert!(arm.header_value("x-ms-client-request-id").is_some());
    }

    #[tokio::test]
    async fn test_not_found_is_cloud_error() {
        let mock = Arc::new(MockTransport::new());
        let client = client(&mock);

        let err = client
            .get("/subscriptions/sub/resourcegroups/missing", "2019-10-01")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!client
            .head("/subscriptions/sub/resourcegroups/missing", "2019-10-01")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_polls_async_operation() {
        let mock = Arc::new(MockTransport::new().with_async_deletes(2));
        let client = client(&mock);
        let path = "/subscriptions/sub/resourcegroups/g";

        client.put(path, "2019-10-01", json!({"location": "eastus"})).await.unwrap();
        assert!(client.delete(path, "2019-10-01").await.unwrap());
        assert!(client.get(path, "2019-10-01").await.unwrap_err().is_not_found());

        let polls = mock
            .requests()
            .await
            .iter()
            .filter(|r| r.url.contains("/operations/"))
            .count();
        assert_eq!(polls, 2);
    }

    const OPERATION: &str =
        "https://management.azure.com/subscriptions/sub/providers/Microsoft.Mock/operations/op1";

    async fn polls(mock: &MockTransport, fragment: &str) -> usize {
        mock.requests()
            .await
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }

    #[tokio::test]
    async fn test_update_with_async_operation_is_polled() {
        let mock = Arc::new(MockTransport::new());
        let client = client(&mock);
        let path = "/subscriptions/sub/resourcegroups/g";
        mock.set_resource(path, json!({"location": "eastus", "tags": {"env": "prod"}}))
            .await;

        mock.script(
            Method::Put,
            path,
            Response::json(200, json!({"properties": {"provisioningState": "Updating"}}))
                .with_header("Azure-AsyncOperation", OPERATION)
                .with_header("Retry-After", "0"),
        )
        .await;
        mock.script(Method::Get, "/operations/op1", Response::json(200, json!({"status": "InProgress"})))
            .await;
        mock.script(Method::Get, "/operations/op1", Response::json(200, json!({"status": "Succeeded"})))
            .await;

        let result = client.put(path, "2019-10-01", json!({"location": "eastus"})).await.unwrap();
        assert_eq!(result["properties"]["provisioningState"], "Succeeded");
        assert_eq!(result["tags"]["env"], "prod");
        assert_eq!(polls(&mock, "/operations/op1").await, 2);
    }

    #[tokio::test]
    async fn test_failed_async_operation_is_cloud_error() {
        let mock = Arc::new(MockTransport::new());
        let client = client(&mock);
        let path = "/subscriptions/sub/resourcegroups/g";

        mock.script(
            Method::Put,
            path,
            Response::json(200, json!({"properties": {"provisioningState": "Updating"}}))
                .with_header("Azure-AsyncOperation", OPERATION),
        )
        .await;
        mock.script(Method::Get, "/operations/op1", Response::json(200, json!({"status": "InProgress"})))
            .await;
        mock.script(
            Method::Get,
            "/operations/op1",
            Response::json(
                200,
                json!({"status": "Failed", "error": {"code": "InternalServerError", "message": "boom"}}),
            ),
        )
        .await;

        let err = client.put(path, "2019-10-01", json!({"location": "eastus"})).await.unwrap_err();
        match err {
            ExecError::Cloud(cloud) => {
                assert_eq!(cloud.code, "InternalServerError");
                assert_eq!(cloud.message, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        mock.script(Method::Delete, path, Response::empty(202).with_header("Azure-AsyncOperation", OPERATION))
            .await;
        mock.script(Method::Get, "/operations/op1", Response::json(200, json!({"status": "Canceled"})))
            .await;
        assert!(matches!(
            client.delete(path, "2019-10-01").await.unwrap_err(),
            ExecError::Cloud(_)
        ));
    }

    #[tokio::test]
    async fn test_created_resource_polled_until_terminal() {
        let mock = Arc::new(MockTransport::new());
        let client = client(&mock);
        let path = "/subscriptions/sub/resourcegroups/g";

        mock.script(
            Method::Put,
            path,
            Response::json(201, json!({"name": "g", "properties": {"provisioningState": "Creating"}})),
        )
        .await;
        mock.script(
            Method::Get,
            path,
            Response::json(200, json!({"name": "g", "properties": {"provisioningState": "Creating"}})),
        )
        .await;
        mock.script(
            Method::Get,
            path,
            Response::json(200, json!({"name": "g", "properties": {"provisioningState": "Succeeded"}})),
        )
        .await;

        let result = client.put(path, "2019-10-01", json!({"location": "eastus"})).await.unwrap();
        assert_eq!(result["properties"]["provisioningState"], "Succeeded");
        let gets = mock
            .requests()
            .await
            .iter()
            .filter(|r| r.method == Method::Get && r.url.contains(path))
            .count();
        assert_eq!(gets, 2);

        mock.script(
            Method::Put,
            path,
            Response::json(201, json!({"properties": {"provisioningState": "Creating"}})),
        )
        .await;
        mock.script(
            Method::Get,
            path,
            Response::json(200, json!({"properties": {"provisioningState": "Failed"}})),
        )
        .await;
        match client.put(path, "2019-10-01", json!({})).await.unwrap_err() {
            ExecError::Cloud(cloud) => assert_eq!(cloud.code, "ProvisioningFailed"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_location_header_is_polled() {
        let mock = Arc::new(MockTransport::new());
        let client = client(&mock);
        let path = "/subscriptions/sub/resourcegroups/g";
        let location = "https://management.azure.com/subscriptions/sub/operationresults/loc1";

        mock.script(
            Method::Delete,
            path,
            Response::empty(202)
                .with_header("Location", location)
                .with_header("Retry-After", "0"),
        )
        .await;
        mock.script(Method::Get, "/operationresults/loc1", Response::empty(202)).await;
        mock.script(Method::Get, "/operationresults/loc1", Response::empty(200)).await;

        assert!(client.delete(path, "2019-10-01").await.unwrap());
        assert_eq!(polls(&mock, "/operationresults/loc1").await, 2);

        mock.set_resource(path, json!({"location": "eastus"})).await;
        mock.script(Method::Put, path, Response::empty(202).with_header("Location", location))
            .await;
        mock.script(Method::Get, "/operationresults/loc1", Response::empty(200)).await;

        let result = client.put(path, "2019-10-01", json!({"location": "eastus"})).await.unwrap();
        assert_eq!(result["location"], "eastus");
        assert_eq!(polls(&mock, "/operationresults/loc1").await, 3);
    }

    #[tokio::test]
    async fn test_managed_identity_token_failure_is_fatal() {
        let mut mock = MockTransport::new();
        mock.token_error = Some("Identity not found".to_string());
        let mock = Arc::new(mock);
        let client = ManagementClient::new(
            Arc::clone(&mock) as Arc<dyn Transport>,
            Credential::ManagedIdentity,
            public_endpoints(),
            ClientType::Resource,
            Some("sub".into()),
        );

        let err = client
            .get("/subscriptions/sub/resourcegroups/g", "2019-10-01")
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        match err {
            ExecError::Fatal(AzurermError::Authentication(AuthError::ManagedIdentity(message))) => {
                assert_eq!(message, "Identity not found")
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(mock.requests().await.iter().any(|r| r.url.contains("169.254.169.254")));
    }
}
