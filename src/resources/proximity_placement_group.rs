//! Proximity placement groups.

use super::{capitalize, ResourceType, Scope};
use crate::diff::{CompareSpec, Comparator};
use crate::factory::ClientType;
use crate::model::{ElementType, FieldSpec, FieldType, ModelSchema, SUB_RESOURCE};
use serde_json::{Map, Value};

/// `ProximityPlacementGroup` model.
pub static PROXIMITY_PLACEMENT_GROUP_MODEL: ModelSchema = ModelSchema {
    name: "ProximityPlacementGroup",
    fields: &[
        FieldSpec::read_only("id", "id", FieldType::Str),
        FieldSpec::read_only("name", "name", FieldType::Str),
        FieldSpec::read_only("type", "type", FieldType::Str),
        FieldSpec::required("location", "location", FieldType::Str),
        FieldSpec::new("tags", "tags", FieldType::Map),
        FieldSpec::new(
            "proximity_placement_group_type",
            "properties.proximityPlacementGroupType",
            FieldType::Str,
        ),
        FieldSpec::read_only(
            "virtual_machines",
            "properties.virtualMachines",
            FieldType::List(ElementType::Object(&SUB_RESOURCE)),
        ),
        FieldSpec::read_only(
            "virtual_machine_scale_sets",
            "properties.virtualMachineScaleSets",
            FieldType::List(ElementType::Object(&SUB_RESOURCE)),
        ),
        FieldSpec::read_only(
            "availability_sets",
            "properties.availabilitySets",
            FieldType::List(ElementType::Object(&SUB_RESOURCE)),
        ),
    ],
};

// `group_type` is accepted as a short alias.
fn normalize(params: &mut Map<String, Value>) {
    if let Some(Value::String(kind)) = params.remove("group_type") {
        params
            .entry("proximity_placement_group_type")
            .or_insert(Value::String(capitalize(&kind)));
    }
}

/// Proximity placement groups.
pub static PROXIMITY_PLACEMENT_GROUP: ResourceType = ResourceType {
    display: "Proximity placement group",
    noun: "proximity placement group",
    client: ClientType::Compute,
    api_version: "2019-12-01",
    scope: Scope::Provider {
        namespace: "Microsoft.Compute",
        type_name: "proximityPlacementGroups",
    },
    model: &PROXIMITY_PLACEMENT_GROUP_MODEL,
    compare: &[
        CompareSpec::new("tags", Comparator::Tags),
        CompareSpec::new("proximity_placement_group_type", Comparator::CaseInsensitive),
    ],
    needs_location: true,
    normalize: Some(normalize),
    links: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_type_alias() {
        let params = PROXIMITY_PLACEMENT_GROUP
            .normalized(json!({"group_type": "ultra"}).as_object().unwrap());
        assert_eq!(
            Value::Object(params),
            json!({"proximity_placement_group_type": "Ultra"})
        );
    }
}
