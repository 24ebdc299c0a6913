//! Exec operations.
//!
//! One ARM operation per call, with the outcome normalized: descriptors come
//! back flattened to snake_case, cloud errors are logged at the call's level
//! and returned as [`ExecError::Cloud`], object-model failures as
//! [`ExecError::ModelBuild`] / [`ExecError::ModelParse`].

use crate::client::ManagementClient;
use crate::factory::{ClientFactory, ClientType};
use crate::model::{flatten, Model};
use crate::resources::{ResourceType, Target, RESOURCE_GROUP};
use crate::validation::validate_resource_name;
use crate::{Call, CloudError, ExecError, ExecResult, LogLevel};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Logs an Azure cloud error at the requested level.
pub fn log_cloud_error(client: ClientType, message: &str, level: LogLevel) {
    let client = client.label();
    match level {
        LogLevel::Trace => tracing::trace!("An Azure {} CloudError has occurred: {}", client, message),
        LogLevel::Debug => tracing::debug!("An Azure {} CloudError has occurred: {}", client, message),
        LogLevel::Info => tracing::info!("An Azure {} CloudError has occurred: {}", client, message),
        LogLevel::Warn => tracing::warn!("An Azure {} CloudError has occurred: {}", client, message),
        LogLevel::Error => tracing::error!("An Azure {} CloudError has occurred: {}", client, message),
    }
}

/// Generic exec surface over [`ResourceType`] entries.
///
/// # Example
///
/// ```no_run
/// use azurerm_state::exec::Exec;
/// use azurerm_state::factory::ClientFactory;
/// use azurerm_state::resources::{Target, AVAILABILITY_SET};
/// use azurerm_state::{Call, Profile};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let exec = Exec::new(ClientFactory::from_registry("http")?);
///     let call = Call::new(Profile::new("sub-id").with_service_principal("app", "secret", "tenant"));
///
///     let aset = exec
///         .get(&call, &AVAILABILITY_SET, &Target::in_group("aset1", "group1"))
///         .await?;
///     println!("{}", serde_json::Value::Object(aset));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Exec {
    factory: ClientFactory,
}

impl Exec {
    /// Creates an exec surface over a client factory.
    pub fn new(factory: ClientFactory) -> Self {
        Self { factory }
    }

    /// Returns the client factory.
    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    /// Creates a client for the call's profile. Failures are fatal.
    pub async fn client(&self, call: &Call, client_type: ClientType) -> ExecResult<ManagementClient> {
        self.factory
            .client(&call.profile, client_type)
            .await
            .map_err(ExecError::Fatal)
    }

    /// Logs a cloud error at the call's level and passes the result through.
    pub fn report<T>(&self, call: &Call, client_type: ClientType, result: ExecResult<T>) -> ExecResult<T> {
        if let Err(ExecError::Cloud(err)) = &result {
            log_cloud_error(client_type, &err.to_string(), call.log_level);
        }
        result
    }

    /// Gets one resource as a flattened descriptor.
    pub async fn get(&self, call: &Call, kind: &ResourceType, target: &Target) -> ExecResult<Map<String, Value>> {
        let client = self.client(call, kind.client).await?;
        let result = async {
            let path = kind.resource_path(client.require_subscription()?, target)?;
            let body = client.get(&path, kind.api_version).await?;
            Ok::<_, ExecError>(flatten(kind.model, &body)?)
        }
        .await;
        self.report(call, kind.client, result)
    }

    /// Lists resources keyed by name, in one resource group or across the
    /// subscription.
    pub async fn list(
        &self,
        call: &Call,
        kind: &ResourceType,
        resource_group: Option<&str>,
    ) -> ExecResult<BTreeMap<String, Map<String, Value>>> {
        let client = self.client(call, kind.client).await?;
        let result = async {
            let path = kind.collection_path(client.require_subscription()?, resource_group)?;
            let items = client.pager(&path, kind.api_version).collect().await?;

            let mut result = BTreeMap::new();
            for item in items {
                let item = flatten(kind.model, &item)?;
                if let Some(Value::String(name)) = item.get("name") {
                    result.insert(name.clone(), item);
                }
            }
            Ok::<_, ExecError>(result)
        }
        .await;
        self.report(call, kind.client, result)
    }

    /// Creates or updates a resource and returns the resulting descriptor.
    ///
    /// Parameters are normalized, `location` is taken from the resource group
    /// when the type needs one and none was given, and name links are
    /// resolved to `{id}` references before the model is built.
    pub async fn create_or_update(
        &self,
        call: &Call,
        kind: &ResourceType,
        target: &Target,
        params: &Map<String, Value>,
    ) -> ExecResult<Map<String, Value>> {
        let mut params = kind.normalized(params);

        if kind.needs_location && params.get("location").map_or(true, Value::is_null) {
            let location = self.group_location(call, kind, target).await?;
            params.insert("location".to_string(), location);
        }

        let client = self.client(call, kind.client).await?;
        let result = async {
            let subscription_id = client.require_subscription()?;
            let path = kind.resource_path(subscription_id, target)?;
            resolve_links(&client, kind, target, &mut params).await;

            let model = Model::build(kind.model, &params)?;
            let body = client.put(&path, kind.api_version, model.to_wire()?).await?;
            Ok::<_, ExecError>(flatten(kind.model, &body)?)
        }
        .await;
        self.report(call, kind.client, result)
    }

    /// Deletes a resource, waiting for the deletion to finish.
    pub async fn delete(&self, call: &Call, kind: &ResourceType, target: &Target) -> ExecResult<bool> {
        let client = self.client(call, kind.client).await?;
        let result = async {
            let path = kind.resource_path(client.require_subscription()?, target)?;
            client.delete(&path, kind.api_version).await
        }
        .await;
        self.report(call, kind.client, result)
    }

    async fn group_location(&self, call: &Call, kind: &ResourceType, target: &Target) -> ExecResult<Value> {
        let group = match target.require_group() {
            Ok(group) => group,
            Err(err) => return self.report(call, kind.client, Err(err.into())),
        };

        let descriptor = self.get(call, &RESOURCE_GROUP, &Target::new(group)).await?;
        match descriptor.get("location") {
            Some(location) if !location.is_null() => Ok(location.clone()),
            _ => {
                tracing::error!("Unable to determine location from resource group specified.");
                Err(CloudError::validation(
                    "Unable to determine location from resource group specified.",
                )
                .into())
            }
        }
    }
}

/// Looks up a linked resource by name and returns its id.
async fn lookup_id(
    client: &ManagementClient,
    link: &crate::resources::IdLink,
    subscription_id: &str,
    group: &str,
    name: &str,
) -> Option<String> {
    if let Err(err) = validate_resource_name(name) {
        tracing::debug!(link = link.type_name, %name, "skipping invalid link: {}", err);
        return None;
    }

    let path = link.path(subscription_id, group, name);
    match client.get(&path, link.api_version).await {
        Ok(body) => body.get("id").and_then(Value::as_str).map(str::to_string),
        Err(err) => {
            tracing::debug!(link = link.type_name, %name, "skipping unresolved link: {}", err);
            None
        }
    }
}

/// Replaces names in link fields with `{id}` references; names that do not
/// resolve are dropped.
async fn resolve_links(
    client: &ManagementClient,
    kind: &ResourceType,
    target: &Target,
    params: &mut Map<String, Value>,
) {
    let (subscription_id, group) = match (client.subscription_id(), target.resource_group.as_deref()) {
        (Some(s), Some(g)) => (s, g),
        _ => return,
    };

    for link in kind.links {
        let items = match params.get_mut(link.field) {
            Some(Value::Array(items)) => items,
            _ => continue,
        };

        match link.key {
            None => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items.iter() {
                    match item {
                        Value::String(name) => {
                            if let Some(id) = lookup_id(client, link, subscription_id, group, name).await {
                                resolved.push(json!({ "id": id }));
                            }
                        }
                        other => resolved.push(other.clone()),
                    }
                }
                *items = resolved;
            }
            Some(key) => {
                for item in items.iter_mut() {
                    let element = match item {
                        Value::Object(element) => element,
                        _ => continue,
                    };
                    let name = match element.get(key) {
                        Some(Value::String(name)) => name.clone(),
                        _ => continue,
                    };
                    match lookup_id(client, link, subscription_id, group, &name).await {
                        Some(id) => {
                            element.insert(key.to_string(), json!({ "id": id }));
                        }
                        None => {
                            element.remove(key);
                        }
                    }
                }
            }
        }
    }
}
