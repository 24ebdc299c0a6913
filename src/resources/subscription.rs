//! Subscriptions.
//!
//! Listing uses the unbound subscription client; the profile's
//! `subscription_id` is still required to authenticate.

use crate::exec::Exec;
use crate::factory::ClientType;
use crate::model::{flatten, FieldSpec, FieldType, ModelSchema};
use crate::{Call, ExecError, ExecResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const API_VERSION: &str = "2019-11-01";

/// `Subscription` model.
pub static SUBSCRIPTION_MODEL: ModelSchema = ModelSchema {
    name: "Subscription",
    fields: &[
        FieldSpec::read_only("id", "id", FieldType::Str),
        FieldSpec::read_only("subscription_id", "subscriptionId", FieldType::Str),
        FieldSpec::read_only("tenant_id", "tenantId", FieldType::Str),
        FieldSpec::read_only("display_name", "displayName", FieldType::Str),
        FieldSpec::read_only("state", "state", FieldType::Str),
        FieldSpec::read_only("authorization_source", "authorizationSource", FieldType::Str),
        FieldSpec::read_only("subscription_policies", "subscriptionPolicies", FieldType::Map),
    ],
};

/// Lists every subscription the credential can see, keyed by subscription id.
pub async fn list(exec: &Exec, call: &Call) -> ExecResult<BTreeMap<String, Map<String, Value>>> {
    let client = exec.client(call, ClientType::Subscription).await?;
    let result = async {
        let items = client.pager("/subscriptions", API_VERSION).collect().await?;

        let mut result = BTreeMap::new();
        for item in items {
            let sub = flatten(&SUBSCRIPTION_MODEL, &item)?;
            if let Some(Value::String(id)) = sub.get("subscription_id") {
                result.insert(id.clone(), sub);
            }
        }
        Ok::<_, ExecError>(result)
    }
    .await;
    exec.report(call, ClientType::Subscription, result)
}
