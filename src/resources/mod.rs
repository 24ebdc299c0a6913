//! Built-in resource types.
//!
//! Every resource type is a static [`ResourceType`] entry: where it lives in
//! the ARM namespace, which API version to speak, its object-model schema and
//! how its fields are compared. The generic [`Exec`](crate::exec::Exec) and
//! [`Reconciler`](crate::state::Reconciler) do the rest.

pub mod availability_set;
pub mod dns_zone;
pub mod proximity_placement_group;
pub mod resource_group;
pub mod subscription;
pub mod virtual_network;

pub use availability_set::AVAILABILITY_SET;
pub use dns_zone::DNS_ZONE;
pub use proximity_placement_group::PROXIMITY_PLACEMENT_GROUP;
pub use resource_group::RESOURCE_GROUP;
pub use virtual_network::VIRTUAL_NETWORK;

use crate::diff::CompareSpec;
use crate::factory::ClientType;
use crate::model::ModelSchema;
use crate::validation::{validate_resource_group_name, validate_resource_name};
use crate::CloudError;
use serde_json::{Map, Value};

/// Where a resource type lives in the ARM namespace.
#[derive(Debug, Clone, Copy)]
pub enum Scope {
    /// `/subscriptions/{s}/resourcegroups/{name}`
    ResourceGroup,
    /// `/subscriptions/{s}/resourceGroups/{g}/providers/{namespace}/{type_name}/{name}`
    Provider {
        /// Provider namespace, e.g. `Microsoft.Compute`
        namespace: &'static str,
        /// Resource type, e.g. `availabilitySets`
        type_name: &'static str,
    },
}

/// A list field whose elements are given as names of other resources in the
/// same resource group and sent as `{id}` references.
#[derive(Debug, Clone, Copy)]
pub struct IdLink {
    /// Parameter holding the list
    pub field: &'static str,
    /// For lists of objects, the key inside each element holding the name
    pub key: Option<&'static str>,
    /// Provider namespace of the referenced resource
    pub namespace: &'static str,
    /// Type of the referenced resource
    pub type_name: &'static str,
    /// API version used to look the referenced resource up
    pub api_version: &'static str,
}

impl IdLink {
    /// Path of the referenced resource.
    pub fn path(&self, subscription_id: &str, resource_group: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
            subscription_id, resource_group, self.namespace, self.type_name, name
        )
    }
}

/// Static description of a resource type.
#[derive(Debug)]
pub struct ResourceType {
    /// Capitalized name used at the start of comments ("Availability set")
    pub display: &'static str,
    /// Lowercase name used inside comments ("availability set")
    pub noun: &'static str,
    /// Client family
    pub client: ClientType,
    /// ARM API version
    pub api_version: &'static str,
    /// Namespace placement
    pub scope: Scope,
    /// Object-model schema
    pub model: &'static ModelSchema,
    /// Compared fields
    pub compare: &'static [CompareSpec],
    /// Default `location` from the containing resource group
    pub needs_location: bool,
    /// Rewrites caller parameters into model shape (aliases, defaults)
    pub normalize: Option<fn(&mut Map<String, Value>)>,
    /// Name-to-id links resolved before a write
    pub links: &'static [IdLink],
}

impl ResourceType {
    /// Applies the type's parameter normalization.
    pub fn normalized(&self, params: &Map<String, Value>) -> Map<String, Value> {
        let mut params = params.clone();
        if let Some(normalize) = self.normalize {
            normalize(&mut params);
        }
        params
    }

    /// ARM path of one resource.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if a name is invalid or a resource group
    /// is required but missing.
    pub fn resource_path(&self, subscription_id: &str, target: &Target) -> Result<String, CloudError> {
        match self.scope {
            Scope::ResourceGroup => {
                validate_resource_group_name(&target.name)?;
                Ok(format!(
                    "/subscriptions/{}/resourcegroups/{}",
                    subscription_id, target.name
                ))
            }
            Scope::Provider {
                namespace,
                type_name,
            } => {
                validate_resource_name(&target.name)?;
                let group = target.require_group()?;
                Ok(format!(
                    "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
                    subscription_id, group, namespace, type_name, target.name
                ))
            }
        }
    }

    /// ARM path of the collection, scoped to a resource group when given.
    pub fn collection_path(&self, subscription_id: &str, resource_group: Option<&str>) -> Result<String, CloudError> {
        match (self.scope, resource_group) {
            (Scope::ResourceGroup, _) => Ok(format!("/subscriptions/{}/resourcegroups", subscription_id)),
            (
                Scope::Provider {
                    namespace,
                    type_name,
                },
                Some(group),
            ) => {
                validate_resource_group_name(group)?;
                Ok(format!(
                    "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
                    subscription_id, group, namespace, type_name
                ))
            }
            (
                Scope::Provider {
                    namespace,
                    type_name,
                },
                None,
            ) => Ok(format!(
                "/subscriptions/{}/providers/{}/{}",
                subscription_id, namespace, type_name
            )),
        }
    }
}

/// The resource a state or exec call addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Resource name
    pub name: String,
    /// Containing resource group; `None` for resource groups themselves
    pub resource_group: Option<String>,
}

impl Target {
    /// A top-level target (resource group).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_group: None,
        }
    }

    /// A target inside a resource group.
    pub fn in_group(name: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_group: Some(resource_group.into()),
        }
    }

    /// Returns the resource group, validated.
    pub fn require_group(&self) -> Result<&str, CloudError> {
        let group = self
            .resource_group
            .as_deref()
            .ok_or_else(|| CloudError::validation("a resource_group must be specified"))?;
        validate_resource_group_name(group)?;
        Ok(group)
    }
}

/// Uppercases the first character and lowercases the rest.
pub(crate) fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Moves a flat parameter under a nested object, e.g. `address_prefixes`
/// into `address_space.address_prefixes`. An explicit nested value wins.
pub(crate) fn nest_param(params: &mut Map<String, Value>, flat: &str, parent: &str, key: &str) {
    let value = match params.remove(flat) {
        Some(v) if !v.is_null() => v,
        _ => return,
    };
    let entry = params
        .entry(parent.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(nested) = entry {
        nested.entry(key.to_string()).or_insert(value);
    }
}

/// Turns a list of id strings into `{id}` references.
pub(crate) fn ids_to_refs(params: &mut Map<String, Value>, field: &str) {
    if let Some(Value::Array(items)) = params.get_mut(field) {
        for item in items.iter_mut() {
            if let Value::String(id) = item {
                *item = serde_json::json!({ "id": id.clone() });
            }
        }
    }
}
