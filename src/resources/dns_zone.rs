//! DNS zones.
//!
//! Zones are global resources: `location` defaults to `global` instead of the
//! resource group's location, and `zone_type` defaults to `Public`. Virtual
//! network links are given as full VNet resource ids.

use super::{ids_to_refs, ResourceType, Scope};
use crate::diff::{CompareSpec, Comparator};
use crate::factory::ClientType;
use crate::model::{ElementType, FieldSpec, FieldType, ModelSchema, SUB_RESOURCE};
use serde_json::{Map, Value};

/// `Zone` model.
pub static ZONE_MODEL: ModelSchema = ModelSchema {
    name: "Zone",
    fields: &[
        FieldSpec::read_only("id", "id", FieldType::Str),
        FieldSpec::read_only("name", "name", FieldType::Str),
        FieldSpec::read_only("type", "type", FieldType::Str),
        FieldSpec::new("etag", "etag", FieldType::Str),
        FieldSpec::required("location", "location", FieldType::Str),
        FieldSpec::new("tags", "tags", FieldType::Map),
        FieldSpec::new("zone_type", "properties.zoneType", FieldType::Str),
        FieldSpec::new(
            "registration_virtual_networks",
            "properties.registrationVirtualNetworks",
            FieldType::List(ElementType::Object(&SUB_RESOURCE)),
        ),
        FieldSpec::new(
            "resolution_virtual_networks",
            "properties.resolutionVirtualNetworks",
            FieldType::List(ElementType::Object(&SUB_RESOURCE)),
        ),
        FieldSpec::read_only(
            "max_number_of_record_sets",
            "properties.maxNumberOfRecordSets",
            FieldType::Int,
        ),
        FieldSpec::read_only(
            "number_of_record_sets",
            "properties.numberOfRecordSets",
            FieldType::Int,
        ),
        FieldSpec::read_only(
            "name_servers",
            "properties.nameServers",
            FieldType::List(ElementType::Scalar),
        ),
    ],
};

fn normalize(params: &mut Map<String, Value>) {
    params
        .entry("location")
        .or_insert_with(|| Value::String("global".to_string()));
    params
        .entry("zone_type")
        .or_insert_with(|| Value::String("Public".to_string()));
    ids_to_refs(params, "registration_virtual_networks");
    ids_to_refs(params, "resolution_virtual_networks");
}

/// DNS zones.
pub static DNS_ZONE: ResourceType = ResourceType {
    display: "DNS zone",
    noun: "DNS zone",
    client: ClientType::Dns,
    api_version: "2018-05-01",
    scope: Scope::Provider {
        namespace: "Microsoft.Network",
        type_name: "dnszones",
    },
    model: &ZONE_MODEL,
    compare: &[
        CompareSpec::new("tags", Comparator::Tags),
        CompareSpec::new("zone_type", Comparator::CaseInsensitive),
        CompareSpec::new("registration_virtual_networks", Comparator::IdList),
        CompareSpec::new("resolution_virtual_networks", Comparator::IdList),
    ],
    needs_location: false,
    normalize: Some(normalize),
    links: &[],
};
