//! Field comparators used by the reconciler.
//!
//! Each resource type declares which of its descriptor fields are compared
//! and how. Only fields the caller supplied are compared; everything else in
//! the current descriptor (read-only ids, provisioning state, defaults the
//! service filled in) is ignored.

use serde_json::{json, Map, Value};
use std::cmp::Ordering;

/// How a single field is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// JSON equality.
    Exact,
    /// Strings compared ignoring ASCII case; other values by equality.
    CaseInsensitive,
    /// Numbers compared by value; numeric strings are accepted.
    Numeric,
    /// String maps compared ignoring insertion order. A missing current
    /// value is treated as `{}`.
    Tags,
    /// Only keys present in the desired value are compared, recursively.
    /// Strings ignore case and arrays ignore order.
    Subset,
    /// Lists of resource ids or bare names, compared on the trailing path
    /// segment ignoring case and order.
    IdList,
    /// Lists of named objects (`subnets`, `security_rules`, ...) paired by
    /// `name`. Keys listed in `convert_id_to_name` hold `{id}` references on
    /// the current side and bare names on the desired side.
    ListOfDicts {
        /// Keys holding `{id}` references remotely
        convert_id_to_name: &'static [&'static str],
    },
}

/// A compared field and its comparator.
#[derive(Debug, Clone, Copy)]
pub struct CompareSpec {
    /// Descriptor field name
    pub field: &'static str,
    /// Comparator
    pub comparator: Comparator,
}

impl CompareSpec {
    /// Creates a compare spec.
    pub const fn new(field: &'static str, comparator: Comparator) -> Self {
        Self { field, comparator }
    }
}

/// Diffs `desired` against `current` field by field.
///
/// Returns `{field: {"old": ..., "new": ...}}` for each supplied field that
/// differs. For [`Comparator::ListOfDicts`] fields the old and new lists are
/// reported sorted by name.
///
/// # Errors
///
/// Returns a comment string when a list-of-dicts field is malformed, e.g.
/// `subnets must be provided as a list of dictionaries!`.
pub fn field_changes(
    specs: &[CompareSpec],
    current: &Map<String, Value>,
    desired: &Map<String, Value>,
) -> Result<Map<String, Value>, String> {
    let mut changes = Map::new();

    for spec in specs {
        let new = match desired.get(spec.field) {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };
        let old = current.get(spec.field).unwrap_or(&Value::Null);

        let change = match spec.comparator {
            Comparator::ListOfDicts { convert_id_to_name } => {
                compare_list_of_dicts(old, new, convert_id_to_name)
                    .map_err(|msg| format!("{} {}", spec.field, msg))?
            }
            Comparator::Tags => {
                let old = if old.is_null() { json!({}) } else { old.clone() };
                (!tags_equal(&old, new)).then(|| json!({"old": old, "new": new}))
            }
            comparator => (!values_equal(comparator, old, new))
                .then(|| json!({"old": old, "new": new})),
        };

        if let Some(change) = change {
            tracing::debug!(field = spec.field, "field differs");
            changes.insert(spec.field.to_string(), change);
        }
    }

    Ok(changes)
}

fn values_equal(comparator: Comparator, old: &Value, new: &Value) -> bool {
    match comparator {
        Comparator::Exact => old == new,
        Comparator::CaseInsensitive => match (old, new) {
            (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
            _ => old == new,
        },
        Comparator::Numeric => match (as_number(old), as_number(new)) {
            (Some(a), Some(b)) => a == b,
            _ => old == new,
        },
        Comparator::Tags => tags_equal(old, new),
        Comparator::Subset => subset_equal(old, new),
        Comparator::IdList => id_names(old) == id_names(new),
        Comparator::ListOfDicts { convert_id_to_name } => {
            matches!(compare_list_of_dicts(old, new, convert_id_to_name), Ok(None))
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn tags_equal(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => a.len() == b.len() && b.iter().all(|(k, v)| a.get(k) == Some(v)),
        _ => old == new,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// True if every key of `new` matches in `old`.
fn subset_equal(old: &Value, new: &Value) -> bool {
    match new {
        Value::Null => true,
        Value::Object(wanted) => match old {
            Value::Object(have) => wanted
                .iter()
                .all(|(k, v)| subset_equal(have.get(k).unwrap_or(&Value::Null), v)),
            _ => false,
        },
        Value::Array(wanted) => match old {
            Value::Array(have) => {
                if have.len() != wanted.len() {
                    return false;
                }
                let mut used = vec![false; have.len()];
                wanted.iter().all(|w| {
                    let hit = have
                        .iter()
                        .enumerate()
                        .find(|(i, h)| !used[*i] && subset_equal(h, w))
                        .map(|(i, _)| i);
                    match hit {
                        Some(i) => {
                            used[i] = true;
                            true
                        }
                        None => false,
                    }
                })
            }
            _ => false,
        },
        Value::Number(_) => match (as_number(old), as_number(new)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        scalar => match (scalar_text(old), scalar_text(scalar)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

/// Trailing path segment of each id, lowercased and sorted.
fn id_names(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items,
        _ => return Vec::new(),
    };

    let mut names: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("id").and_then(Value::as_str),
            _ => None,
        })
        .map(|id| id.rsplit('/').next().unwrap_or(id).to_lowercase())
        .collect();
    names.sort();
    names
}

fn by_name(a: &Value, b: &Value) -> Ordering {
    let name = |v: &Value| v.get("name").and_then(Value::as_str).map(str::to_string);
    name(a).cmp(&name(b))
}

fn id_to_name(value: Option<&Value>) -> Value {
    let id = value
        .and_then(|v| v.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("");
    Value::String(id.rsplit('/').next().unwrap_or("").to_string())
}

fn lowered(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other.clone(),
    }
}

/// Compares two lists of named objects.
///
/// Returns `Ok(None)` when they match, `Ok(Some({old, new}))` when they differ
/// and `Err(comment)` when the desired value is malformed.
pub fn compare_list_of_dicts(
    old: &Value,
    new: &Value,
    convert_id_to_name: &[&str],
) -> Result<Option<Value>, String> {
    let local = new
        .as_array()
        .ok_or_else(|| "must be provided as a list of dictionaries!".to_string())?;
    let remote: &[Value] = old.as_array().map(Vec::as_slice).unwrap_or(&[]);

    if local.len() != remote.len() {
        return Ok(Some(json!({"old": old, "new": new})));
    }

    for item in local.iter().chain(remote) {
        let map = item
            .as_object()
            .ok_or_else(|| "configurations must be provided as a list of dictionaries!".to_string())?;
        if !map.get("name").is_some_and(Value::is_string) {
            return Err("configuration dictionaries must contain the \"name\" key!".to_string());
        }
    }

    let mut local = local.clone();
    let mut remote = remote.to_vec();
    local.sort_by(by_name);
    remote.sort_by(by_name);

    for (cfg, remote_cfg) in local.iter().zip(&remote) {
        let differs = cfg.as_object().into_iter().flatten().any(|(key, val)| {
            if convert_id_to_name.contains(&key.as_str()) {
                let remote_name = id_to_name(remote_cfg.get(key));
                lowered(val) != lowered(&remote_name)
            } else {
                let remote_val = remote_cfg.get(key).unwrap_or(&Value::Null);
                lowered(val) != lowered(remote_val)
            }
        });
        if differs {
            return Ok(Some(json!({"old": remote, "new": local})));
        }
    }

    Ok(None)
}
