//! Resource groups.

use super::{ResourceType, Scope, Target};
use crate::diff::{CompareSpec, Comparator};
use crate::exec::Exec;
use crate::factory::ClientType;
use crate::model::{FieldSpec, FieldType, ModelSchema};
use crate::{Call, ExecResult};

const API_VERSION: &str = "2019-10-01";

/// `ResourceGroup` model.
pub static RESOURCE_GROUP_MODEL: ModelSchema = ModelSchema {
    name: "ResourceGroup",
    fields: &[
        FieldSpec::read_only("id", "id", FieldType::Str),
        FieldSpec::read_only("name", "name", FieldType::Str),
        FieldSpec::read_only("type", "type", FieldType::Str),
        FieldSpec::required("location", "location", FieldType::Str),
        FieldSpec::new("managed_by", "managedBy", FieldType::Str),
        FieldSpec::new("tags", "tags", FieldType::Map),
        FieldSpec::read_only(
            "provisioning_state",
            "properties.provisioningState",
            FieldType::Str,
        ),
    ],
};

/// Resource groups.
pub static RESOURCE_GROUP: ResourceType = ResourceType {
    display: "Resource group",
    noun: "resource group",
    client: ClientType::Resource,
    api_version: API_VERSION,
    scope: Scope::ResourceGroup,
    model: &RESOURCE_GROUP_MODEL,
    compare: &[
        CompareSpec::new("tags", Comparator::Tags),
        CompareSpec::new("managed_by", Comparator::CaseInsensitive),
    ],
    needs_location: false,
    normalize: None,
    links: &[],
};

/// Checks whether a resource group exists.
pub async fn check_existence(exec: &Exec, call: &Call, name: &str) -> ExecResult<bool> {
    let client = exec.client(call, RESOURCE_GROUP.client).await?;
    let result = async {
        let path = RESOURCE_GROUP.resource_path(client.require_subscription()?, &Target::new(name))?;
        client.head(&path, API_VERSION).await
    }
    .await;
    exec.report(call, RESOURCE_GROUP.client, result)
}

