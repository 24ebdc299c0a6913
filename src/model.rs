//! Schema-driven object models.
//!
//! Request payloads are assembled from flat snake_case parameters by walking a
//! static [`ModelSchema`]. Each field names its wire location as a dotted path
//! (`properties.platformFaultDomainCount`) and its [`FieldType`]; object and
//! list-of-object fields point straight at the nested schema, so nested models
//! are built by recursion rather than by looking a type up by name.
//!
//! The reverse direction, [`flatten`], turns a wire response back into the
//! snake_case descriptor the reconciler diffs against.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while building or serializing a model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A required field was not supplied.
    #[error("{model}: missing required field '{attr}'")]
    MissingField {
        /// Model name
        model: &'static str,
        /// Attribute name
        attr: &'static str,
    },

    /// A supplied value has the wrong shape for its field.
    #[error("{model}.{attr}: expected {expected}, got {found}")]
    TypeMismatch {
        /// Model name
        model: &'static str,
        /// Attribute name
        attr: &'static str,
        /// Expected shape
        expected: String,
        /// Shape that was supplied
        found: &'static str,
    },

    /// Two fields map onto the same wire location incompatibly.
    #[error("{model}: wire key '{key}' is already occupied by a non-object value")]
    WireConflict {
        /// Model name
        model: &'static str,
        /// Conflicting path segment
        key: String,
    },

    /// A response body was not a JSON object.
    #[error("{model}: expected a JSON object, got {found}")]
    NotAnObject {
        /// Model name
        model: &'static str,
        /// Shape that was received
        found: &'static str,
    },
}

impl ModelError {
    /// True for errors raised while converting to or from the wire format.
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::WireConflict { .. } | Self::NotAnObject { .. })
    }
}

/// Type of a single field.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    /// String; numbers and booleans are accepted and rendered as text
    Str,
    /// Integer; numeric strings are accepted
    Int,
    /// Boolean
    Bool,
    /// Any JSON value, passed through
    Any,
    /// String-keyed mapping (`{str}`), passed through
    Map,
    /// Nested model
    Object(&'static ModelSchema),
    /// List of elements
    List(ElementType),
}

/// Element type of a list field.
#[derive(Debug, Clone, Copy)]
pub enum ElementType {
    /// Scalars, passed through
    Scalar,
    /// Mappings, passed through
    Map,
    /// Nested models
    Object(&'static ModelSchema),
}

/// One field of a model.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Snake_case attribute name used in parameters and descriptors
    pub attr: &'static str,
    /// Dotted wire path
    pub key: &'static str,
    /// Field type
    pub ty: FieldType,
    /// Must be supplied when building
    pub required: bool,
    /// Server-populated; never sent
    pub read_only: bool,
}

impl FieldSpec {
    /// A writable, optional field.
    pub const fn new(attr: &'static str, key: &'static str, ty: FieldType) -> Self {
        Self {
            attr,
            key,
            ty,
            required: false,
            read_only: false,
        }
    }

    /// A writable field that must be supplied.
    pub const fn required(attr: &'static str, key: &'static str, ty: FieldType) -> Self {
        Self {
            attr,
            key,
            ty,
            required: true,
            read_only: false,
        }
    }

    /// A server-populated field.
    pub const fn read_only(attr: &'static str, key: &'static str, ty: FieldType) -> Self {
        Self {
            attr,
            key,
            ty,
            required: false,
            read_only: true,
        }
    }
}

/// Static description of a model.
#[derive(Debug)]
pub struct ModelSchema {
    /// Model name, used in error messages
    pub name: &'static str,
    /// Fields in declaration order
    pub fields: &'static [FieldSpec],
}

impl ModelSchema {
    /// Looks up a field by attribute name.
    pub fn field(&self, attr: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.attr == attr)
    }
}

/// Shared `SubResource` model: a bare `{id}` reference.
pub static SUB_RESOURCE: ModelSchema = ModelSchema {
    name: "SubResource",
    fields: &[FieldSpec::new("id", "id", FieldType::Str)],
};

/// A built model value.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelValue {
    /// Scalar, map or passthrough value
    Raw(Value),
    /// Nested model
    Object(Model),
    /// List of values
    List(Vec<ModelValue>),
}

/// An instance of a [`ModelSchema`] built from parameters.
#[derive(Debug, Clone)]
pub struct Model {
    schema: &'static ModelSchema,
    values: BTreeMap<&'static str, ModelValue>,
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.schema, other.schema) && self.values == other.values
    }
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

impl Model {
    /// Builds a model from flat parameters.
    ///
    /// Unknown parameters and read-only fields are ignored; null values are
    /// treated as absent.
    ///
    /// # Errors
    ///
    /// - [`ModelError::MissingField`]: a required field is absent
    /// - [`ModelError::TypeMismatch`]: a value has the wrong shape
    ///
    /// # Example
    ///
    /// ```
    /// use azurerm_state::model::{Model, ModelSchema, FieldSpec, FieldType, SUB_RESOURCE};
    /// use serde_json::json;
    ///
    /// static THING: ModelSchema = ModelSchema {
    ///     name: "Thing",
    ///     fields: &[
    ///         FieldSpec::required("location", "location", FieldType::Str),
    ///         FieldSpec::new("group", "properties.group", FieldType::Object(&SUB_RESOURCE)),
    ///     ],
    /// };
    ///
    /// let params = json!({"location": "eastus", "group": {"id": "/x/y"}});
    /// let model = Model::build(&THING, params.as_object().unwrap()).unwrap();
    /// assert_eq!(
    ///     model.to_wire().unwrap(),
    ///     json!({"location": "eastus", "properties": {"group": {"id": "/x/y"}}})
    /// );
    /// ```
    pub fn build(schema: &'static ModelSchema, params: &Map<String, Value>) -> Result<Self, ModelError> {
        let mut values = BTreeMap::new();

        for field in schema.fields.iter().filter(|f| !f.read_only) {
            let value = match params.get(field.attr) {
                Some(v) if !v.is_null() => v,
                _ => {
                    if field.required {
                        return Err(ModelError::MissingField {
                            model: schema.name,
                            attr: field.attr,
                        });
                    }
                    continue;
                }
            };
            values.insert(field.attr, build_value(schema, field, value)?);
        }

        Ok(Self { schema, values })
    }

    /// Returns the schema this model was built from.
    pub fn schema(&self) -> &'static ModelSchema {
        self.schema
    }

    /// Returns a built value by attribute name.
    pub fn get(&self, attr: &str) -> Option<&ModelValue> {
        self.values.get(attr)
    }

    /// Serializes the model to its wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::WireConflict`] if two fields claim overlapping
    /// wire paths.
    pub fn to_wire(&self) -> Result<Value, ModelError> {
        let mut out = Map::new();
        for field in self.schema.fields {
            if let Some(value) = self.values.get(field.attr) {
                let wire = value_to_wire(value)?;
                insert_path(&mut out, self.schema.name, field.key, wire)?;
            }
        }
        Ok(Value::Object(out))
    }
}

fn mismatch(schema: &ModelSchema, field: &FieldSpec, expected: impl Into<String>, found: &Value) -> ModelError {
    ModelError::TypeMismatch {
        model: schema.name,
        attr: field.attr,
        expected: expected.into(),
        found: shape(found),
    }
}

fn build_value(schema: &ModelSchema, field: &FieldSpec, value: &Value) -> Result<ModelValue, ModelError> {
    match field.ty {
        FieldType::Object(nested) => match value {
            Value::Object(map) => Ok(ModelValue::Object(Model::build(nested, map)?)),
            other => Err(mismatch(schema, field, nested.name, other)),
        },
        FieldType::Map => match value {
            Value::Object(_) => Ok(ModelValue::Raw(value.clone())),
            other => Err(mismatch(schema, field, "mapping", other)),
        },
        FieldType::List(element) => {
            let items = value
                .as_array()
                .ok_or_else(|| mismatch(schema, field, "list", value))?;
            items
                .iter()
                .map(|item| build_element(schema, field, element, item))
                .collect::<Result<Vec<_>, _>>()
                .map(ModelValue::List)
        }
        FieldType::Str => match value {
            Value::String(_) => Ok(ModelValue::Raw(value.clone())),
            Value::Number(n) => Ok(ModelValue::Raw(Value::String(n.to_string()))),
            Value::Bool(b) => Ok(ModelValue::Raw(Value::String(b.to_string()))),
            other => Err(mismatch(schema, field, "string", other)),
        },
        FieldType::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(ModelValue::Raw(value.clone())),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| ModelValue::Raw(Value::from(n)))
                .map_err(|_| mismatch(schema, field, "integer", value)),
            other => Err(mismatch(schema, field, "integer", other)),
        },
        FieldType::Bool => match value {
            Value::Bool(_) => Ok(ModelValue::Raw(value.clone())),
            other => Err(mismatch(schema, field, "boolean", other)),
        },
        FieldType::Any => Ok(ModelValue::Raw(value.clone())),
    }
}

fn build_element(
    schema: &ModelSchema,
    field: &FieldSpec,
    element: ElementType,
    item: &Value,
) -> Result<ModelValue, ModelError> {
    match (element, item) {
        (ElementType::Object(nested), Value::Object(map)) => {
            Ok(ModelValue::Object(Model::build(nested, map)?))
        }
        (ElementType::Object(nested), other) => {
            Err(mismatch(schema, field, format!("list of {}", nested.name), other))
        }
        (ElementType::Map, Value::Object(_)) => Ok(ModelValue::Raw(item.clone())),
        (ElementType::Map, other) => Err(mismatch(schema, field, "list of mappings", other)),
        (ElementType::Scalar, _) => Ok(ModelValue::Raw(item.clone())),
    }
}

fn value_to_wire(value: &ModelValue) -> Result<Value, ModelError> {
    match value {
        ModelValue::Raw(v) => Ok(v.clone()),
        ModelValue::Object(model) => model.to_wire(),
        ModelValue::List(items) => items
            .iter()
            .map(value_to_wire)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
    }
}

fn insert_path(out: &mut Map<String, Value>, model: &'static str, key: &str, value: Value) -> Result<(), ModelError> {
    let mut segments = key.split('.').peekable();
    let mut cursor = out;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            cursor.insert(segment.to_string(), value);
            return Ok(());
        }
        let entry = cursor
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        cursor = entry.as_object_mut().ok_or_else(|| ModelError::WireConflict {
            model,
            key: segment.to_string(),
        })?;
    }

    Ok(())
}

fn lookup_path<'a>(wire: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut segments = key.split('.');
    let first = segments.next()?;
    let mut current = wire.get(first)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Flattens a wire object into a snake_case descriptor.
///
/// Fields missing from the wire or null are omitted; wire keys the schema
/// does not declare are dropped.
///
/// # Errors
///
/// Returns [`ModelError::NotAnObject`] if `wire` is not a JSON object.
pub fn flatten(schema: &'static ModelSchema, wire: &Value) -> Result<Map<String, Value>, ModelError> {
    let object = wire.as_object().ok_or(ModelError::NotAnObject {
        model: schema.name,
        found: shape(wire),
    })?;

    let mut out = Map::new();
    for field in schema.fields {
        let value = match lookup_path(object, field.key) {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };
        let flat = match (field.ty, value) {
            (FieldType::Object(nested), Value::Object(_)) => Value::Object(flatten(nested, value)?),
            (FieldType::List(ElementType::Object(nested)), Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(_) => flatten(nested, item).map(Value::Object),
                        other => Ok(other.clone()),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            (_, other) => other.clone(),
        };
        out.insert(field.attr.to_string(), flat);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static FOO: ModelSchema = ModelSchema {
        name: "Foo",
        fields: &[
            FieldSpec::required("name", "name", FieldType::Str),
            FieldSpec::new("size", "properties.size", FieldType::Int),
        ],
    };

    static PARENT: ModelSchema = ModelSchema {
        name: "Parent",
        fields: &[
            FieldSpec::read_only("id", "id", FieldType::Str),
            FieldSpec::required("location", "location", FieldType::Str),
            FieldSpec::new("tags", "tags", FieldType::Map),
            FieldSpec::new("foo", "properties.foo", FieldType::Object(&FOO)),
            FieldSpec::new("foos", "properties.foos", FieldType::List(ElementType::Object(&FOO))),
            FieldSpec::new("labels", "properties.labels", FieldType::List(ElementType::Map)),
            FieldSpec::new("names", "properties.names", FieldType::List(ElementType::Scalar)),
            FieldSpec::new("enabled", "properties.enabled", FieldType::Bool),
        ],
    };

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_nested_object_is_built_recursively() {
        let model = Model::build(
            &PARENT,
            &params(json!({"location": "eastus", "foo": {"name": "a", "size": 2}})),
        )
        .unwrap();

        match model.get("foo") {
            Some(ModelValue::Object(foo)) => {
                assert_eq!(foo.schema().name, "Foo");
                assert_eq!(foo.get("size"), Some(&ModelValue::Raw(json!(2))));
            }
            other => panic!("expected nested Foo, got {:?}", other),
        }
    }

    #[test]
    fn test_list_of_objects_and_passthrough() {
        let model = Model::build(
            &PARENT,
            &params(json!({
                "location": "eastus",
                "tags": {"env": "prod"},
                "foos": [{"name": "a"}, {"name": "b", "size": "3"}],
                "labels": [{"k": "v"}],
                "names": ["x", "y"],
                "enabled": true,
                "unknown": "ignored"
            })),
        )
        .unwrap();

        assert_eq!(
            model.to_wire().unwrap(),
            json!({
                "location": "eastus",
                "tags": {"env": "prod"},
                "properties": {
                    "foos": [{"name": "a"}, {"name": "b", "properties": {"size": 3}}],
                    "labels": [{"k": "v"}],
                    "names": ["x", "y"],
                    "enabled": true
                }
            })
        );
    }

    #[test]
    fn test_read_only_and_null_fields_are_skipped() {
        let model = Model::build(
            &PARENT,
            &params(json!({"id": "/x", "location": "eastus", "tags": null})),
        )
        .unwrap();
        assert_eq!(model.to_wire().unwrap(), json!({"location": "eastus"}));
    }

    #[test]
    fn test_missing_required_field() {
        let err = Model::build(&PARENT, &params(json!({"foo": {"name": "a"}}))).unwrap_err();
        assert_eq!(
            err,
            ModelError::MissingField {
                model: "Parent",
                attr: "location"
            }
        );

        let err = Model::build(&PARENT, &params(json!({"location": "l", "foo": {"size": 1}})))
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingField { model: "Foo", attr: "name" }));
    }

    #[test]
    fn test_shape_mismatches() {
        let cases = vec![
            json!({"location": "l", "foo": "not-a-mapping"}),
            json!({"location": "l", "tags": ["a"]}),
            json!({"location": "l", "foos": {"name": "a"}}),
            json!({"location": "l", "foos": ["a"]}),
            json!({"location": "l", "labels": ["a"]}),
            json!({"location": "l", "enabled": "yes"}),
            json!({"location": {"nested": true}}),
            json!({"location": "l", "foo": {"name": "a", "size": "big"}}),
        ];

        for case in cases {
            let err = Model::build(&PARENT, &params(case.clone())).unwrap_err();
            assert!(
                matches!(err, ModelError::TypeMismatch { .. }),
                "expected mismatch for {}",
                case
            );
            assert!(!err.is_serialization());
        }
    }

    #[test]
    fn test_scalar_coercion() {
        let model = Model::build(&FOO, &params(json!({"name": 42, "size": " 7 "}))).unwrap();
        assert_eq!(
            model.to_wire().unwrap(),
            json!({"name": "42", "properties": {"size": 7}})
        );
    }

    #[test]
    fn test_wire_conflict() {
        static CLASH: ModelSchema = ModelSchema {
            name: "Clash",
            fields: &[
                FieldSpec::new("props", "properties", FieldType::Str),
                FieldSpec::new("inner", "properties.inner", FieldType::Str),
            ],
        };

        let model = Model::build(&CLASH, &params(json!({"props": "x", "inner": "y"}))).unwrap();
        let err = model.to_wire().unwrap_err();
        assert!(err.is_serialization());
    }

    #[test]
    fn test_flatten_round_trips_descriptor_shape() {
        let wire = json!({
            "id": "/subscriptions/s/resourceGroups/g/providers/P/parents/p",
            "location": "eastus",
            "etag": "dropped",
            "properties": {
                "foo": {"name": "a", "properties": {"size": 1}},
                "foos": [{"name": "b"}],
                "enabled": null
            }
        });

        let flat = flatten(&PARENT, &wire).unwrap();
        assert_eq!(
            Value::Object(flat),
            json!({
                "id": "/subscriptions/s/resourceGroups/g/providers/P/parents/p",
                "location": "eastus",
                "foo": {"name": "a", "size": 1},
                "foos": [{"name": "b"}]
            })
        );

        assert!(matches!(
            flatten(&PARENT, &json!("text")),
            Err(ModelError::NotAnObject { .. })
        ));
    }
}
