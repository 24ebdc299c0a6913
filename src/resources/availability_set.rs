//! Availability sets.
//!
//! `sku` may be given as a bare string (`aligned`, `classic`); it is sent as
//! `{"name": "Aligned"}`. `virtual_machines` takes VM names from the same
//! resource group; unknown names are dropped when the set is written.

use super::{capitalize, IdLink, ResourceType, Scope, Target};
use crate::diff::{CompareSpec, Comparator};
use crate::exec::Exec;
use crate::factory::ClientType;
use crate::model::{flatten, ElementType, FieldSpec, FieldType, ModelSchema, SUB_RESOURCE};
use crate::{Call, ExecError, ExecResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const API_VERSION: &str = "2019-12-01";

/// `Sku` model shared by compute resources.
pub static SKU: ModelSchema = ModelSchema {
    name: "Sku",
    fields: &[
        FieldSpec::new("name", "name", FieldType::Str),
        FieldSpec::new("tier", "tier", FieldType::Str),
        FieldSpec::new("capacity", "capacity", FieldType::Int),
    ],
};

/// `AvailabilitySet` model.
pub static AVAILABILITY_SET_MODEL: ModelSchema = ModelSchema {
    name: "AvailabilitySet",
    fields: &[
        FieldSpec::read_only("id", "id", FieldType::Str),
        FieldSpec::read_only("name", "name", FieldType::Str),
        FieldSpec::read_only("type", "type", FieldType::Str),
        FieldSpec::required("location", "location", FieldType::Str),
        FieldSpec::new("tags", "tags", FieldType::Map),
        FieldSpec::new("sku", "sku", FieldType::Object(&SKU)),
        FieldSpec::new(
            "platform_update_domain_count",
            "properties.platformUpdateDomainCount",
            FieldType::Int,
        ),
        FieldSpec::new(
            "platform_fault_domain_count",
            "properties.platformFaultDomainCount",
            FieldType::Int,
        ),
        FieldSpec::new(
            "virtual_machines",
            "properties.virtualMachines",
            FieldType::List(ElementType::Object(&SUB_RESOURCE)),
        ),
        FieldSpec::new(
            "proximity_placement_group",
            "properties.proximityPlacementGroup",
            FieldType::Object(&SUB_RESOURCE),
        ),
        FieldSpec::read_only(
            "statuses",
            "properties.statuses",
            FieldType::List(ElementType::Map),
        ),
    ],
};

/// `VirtualMachineSize` model.
pub static VIRTUAL_MACHINE_SIZE_MODEL: ModelSchema = ModelSchema {
    name: "VirtualMachineSize",
    fields: &[
        FieldSpec::read_only("name", "name", FieldType::Str),
        FieldSpec::read_only("number_of_cores", "numberOfCores", FieldType::Int),
        FieldSpec::read_only("os_disk_size_in_mb", "osDiskSizeInMB", FieldType::Int),
        FieldSpec::read_only(
            "resource_disk_size_in_mb",
            "resourceDiskSizeInMB",
            FieldType::Int,
        ),
        FieldSpec::read_only("memory_in_mb", "memoryInMB", FieldType::Int),
        FieldSpec::read_only("max_data_disk_count", "maxDataDiskCount", FieldType::Int),
    ],
};

fn normalize(params: &mut Map<String, Value>) {
    if let Some(Value::String(sku)) = params.get("sku") {
        let name = capitalize(sku);
        params.insert("sku".to_string(), serde_json::json!({ "name": name }));
    }
}

/// Availability sets.
pub static AVAILABILITY_SET: ResourceType = ResourceType {
    display: "Availability set",
    noun: "availability set",
    client: ClientType::Compute,
    api_version: API_VERSION,
    scope: Scope::Provider {
        namespace: "Microsoft.Compute",
        type_name: "availabilitySets",
    },
    model: &AVAILABILITY_SET_MODEL,
    compare: &[
        CompareSpec::new("tags", Comparator::Tags),
        CompareSpec::new("platform_update_domain_count", Comparator::Numeric),
        CompareSpec::new("platform_fault_domain_count", Comparator::Numeric),
        CompareSpec::new("sku", Comparator::Subset),
        CompareSpec::new("virtual_machines", Comparator::IdList),
    ],
    needs_location: true,
    normalize: Some(normalize),
    links: &[IdLink {
        field: "virtual_machines",
        key: None,
        namespace: "Microsoft.Compute",
        type_name: "virtualMachines",
        api_version: API_VERSION,
    }],
};

/// Lists the VM sizes that can be deployed into an existing availability set,
/// keyed by size name.
pub async fn list_available_sizes(
    exec: &Exec,
    call: &Call,
    name: &str,
    resource_group: &str,
) -> ExecResult<BTreeMap<String, Map<String, Value>>> {
    let client = exec.client(call, AVAILABILITY_SET.client).await?;
    let result = async {
        let target = Target::in_group(name, resource_group);
        let path = AVAILABILITY_SET.resource_path(client.require_subscription()?, &target)?;
        let sizes = client
            .pager(&format!("{}/vmSizes", path), API_VERSION)
            .collect()
            .await?;

        let mut result = BTreeMap::new();
        for size in sizes {
            let size = flatten(&VIRTUAL_MACHINE_SIZE_MODEL, &size)?;
            if let Some(Value::String(name)) = size.get("name") {
                result.insert(name.clone(), size);
            }
        }
        Ok::<_, ExecError>(result)
    }
    .await;
    exec.report(call, AVAILABILITY_SET.client, result)
}
