//! Virtual networks.
//!
//! `address_prefixes` and `dns_servers` are accepted as flat lists and sent
//! as `addressSpace` / `dhcpOptions`. Subnets are compared by name; their
//! `network_security_group` and `route_table` are given as names of
//! resources in the same resource group.

use super::{nest_param, IdLink, ResourceType, Scope};
use crate::diff::{CompareSpec, Comparator};
use crate::factory::ClientType;
use crate::model::{ElementType, FieldSpec, FieldType, ModelSchema, SUB_RESOURCE};
use serde_json::{Map, Value};

const API_VERSION: &str = "2019-11-01";

/// `AddressSpace` model.
pub static ADDRESS_SPACE: ModelSchema = ModelSchema {
    name: "AddressSpace",
    fields: &[FieldSpec::new(
        "address_prefixes",
        "addressPrefixes",
        FieldType::List(ElementType::Scalar),
    )],
};

/// `DhcpOptions` model.
pub static DHCP_OPTIONS: ModelSchema = ModelSchema {
    name: "DhcpOptions",
    fields: &[FieldSpec::new(
        "dns_servers",
        "dnsServers",
        FieldType::List(ElementType::Scalar),
    )],
};

/// `Subnet` model.
pub static SUBNET: ModelSchema = ModelSchema {
    name: "Subnet",
    fields: &[
        FieldSpec::read_only("id", "id", FieldType::Str),
        FieldSpec::required("name", "name", FieldType::Str),
        FieldSpec::new("address_prefix", "properties.addressPrefix", FieldType::Str),
        FieldSpec::new(
            "network_security_group",
            "properties.networkSecurityGroup",
            FieldType::Object(&SUB_RESOURCE),
        ),
        FieldSpec::new(
            "route_table",
            "properties.routeTable",
            FieldType::Object(&SUB_RESOURCE),
        ),
        FieldSpec::new(
            "service_endpoints",
            "properties.serviceEndpoints",
            FieldType::List(ElementType::Map),
        ),
        FieldSpec::read_only(
            "provisioning_state",
            "properties.provisioningState",
            FieldType::Str,
        ),
    ],
};

/// `VirtualNetwork` model.
pub static VIRTUAL_NETWORK_MODEL: ModelSchema = ModelSchema {
    name: "VirtualNetwork",
    fields: &[
        FieldSpec::read_only("id", "id", FieldType::Str),
        FieldSpec::read_only("name", "name", FieldType::Str),
        FieldSpec::read_only("type", "type", FieldType::Str),
        FieldSpec::read_only("etag", "etag", FieldType::Str),
        FieldSpec::required("location", "location", FieldType::Str),
        FieldSpec::new("tags", "tags", FieldType::Map),
        FieldSpec::new(
            "address_space",
            "properties.addressSpace",
            FieldType::Object(&ADDRESS_SPACE),
        ),
        FieldSpec::new(
            "dhcp_options",
            "properties.dhcpOptions",
            FieldType::Object(&DHCP_OPTIONS),
        ),
        FieldSpec::new(
            "subnets",
            "properties.subnets",
            FieldType::List(ElementType::Object(&SUBNET)),
        ),
        FieldSpec::new(
            "enable_ddos_protection",
            "properties.enableDdosProtection",
            FieldType::Bool,
        ),
        FieldSpec::new(
            "enable_vm_protection",
            "properties.enableVmProtection",
            FieldType::Bool,
        ),
        FieldSpec::read_only(
            "provisioning_state",
            "properties.provisioningState",
            FieldType::Str,
        ),
    ],
};

fn normalize(params: &mut Map<String, Value>) {
    nest_param(params, "address_prefixes", "address_space", "address_prefixes");
    nest_param(params, "dns_servers", "dhcp_options", "dns_servers");
}

/// Virtual networks.
pub static VIRTUAL_NETWORK: ResourceType = ResourceType {
    display: "Virtual network",
    noun: "virtual network",
    client: ClientType::Network,
    api_version: API_VERSION,
    scope: Scope::Provider {
        namespace: "Microsoft.Network",
        type_name: "virtualNetworks",
    },
    model: &VIRTUAL_NETWORK_MODEL,
    compare: &[
        CompareSpec::new("tags", Comparator::Tags),
        CompareSpec::new("address_space", Comparator::Subset),
        CompareSpec::new("dhcp_options", Comparator::Subset),
        CompareSpec::new(
            "subnets",
            Comparator::ListOfDicts {
                convert_id_to_name: &["network_security_group", "route_table"],
            },
        ),
        CompareSpec::new("enable_ddos_protection", Comparator::Exact),
        CompareSpec::new("enable_vm_protection", Comparator::Exact),
    ],
    needs_location: true,
    normalize: Some(normalize),
    links: &[
        IdLink {
            field: "subnets",
            key: Some("network_security_group"),
            namespace: "Microsoft.Network",
            type_name: "networkSecurityGroups",
            api_version: API_VERSION,
        },
        IdLink {
            field: "subnets",
            key: Some("route_table"),
            namespace: "Microsoft.Network",
            type_name: "routeTables",
            api_version: API_VERSION,
        },
    ],
};
