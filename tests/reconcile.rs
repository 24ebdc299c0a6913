//! End-to-end reconciliation against the in-memory ARM transport.

#![cfg(feature = "mock")]

use azurerm_state::exec::Exec;
use azurerm_state::resources::{
    availability_set, resource_group, subscription, Target, AVAILABILITY_SET, DNS_ZONE, RESOURCE_GROUP,
};
use azurerm_state::transports::mock::{MockTransport, MOCK_SUBSCRIPTION_ID};
use azurerm_state::{
    AuthError, AzurermError, Call, ClientFactory, CloudError, Context, Profile, Reconciler,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

const SUB: &str = "sub";

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn profile() -> Profile {
    Profile::new(SUB).with_service_principal("client", "secret", "tenant")
}

fn ctx() -> Context {
    Context::new(profile())
}

async fn setup(mock: MockTransport) -> (Arc<MockTransport>, Reconciler) {
    let mock = Arc::new(mock);
    mock.set_resource(
        "/subscriptions/sub/resourcegroups/group1",
        json!({"location": "westus2"}),
    )
    .await;

    let factory = ClientFactory::new(mock.clone()).with_poll_interval(Duration::from_millis(1));
    (mock, Reconciler::new(Exec::new(factory)))
}

fn aset1() -> Target {
    Target::in_group("aset1", "group1")
}

#[tokio::test]
async fn test_availability_set_create_then_delete() {
    let (mock, reconciler) = setup(MockTransport::new()).await;
    let ctx = ctx();
    let desired = params(json!({"platform_fault_domain_count": 3, "sku": "aligned"}));

    let ret = reconciler
        .present(&ctx, &AVAILABILITY_SET, &aset1(), &desired, None)
        .await
        .unwrap();
    assert_eq!(ret.name, "aset1");
    assert_eq!(ret.result, Some(true));
    assert_eq!(ret.comment, "Availability set aset1 has been created.");
    assert_eq!(
        Value::Object(ret.changes),
        json!({
            "old": {},
            "new": {
                "name": "aset1",
                "resource_group": "group1",
                "platform_fault_domain_count": 3,
                "sku": {"name": "Aligned"}
            }
        })
    );

    let previous = reconciler
        .exec()
        .get(&Call::new(profile()), &AVAILABILITY_SET, &aset1())
        .await
        .unwrap();
    assert_eq!(previous["location"], "westus2");

    let ret = reconciler
        .absent(&ctx, &AVAILABILITY_SET, &aset1(), None)
        .await
        .unwrap();
    assert_eq!(ret.result, Some(true));
    assert_eq!(ret.comment, "Availability set aset1 has been deleted.");
    assert_eq!(
        Value::Object(ret.changes),
        json!({"old": Value::Object(previous), "new": {}})
    );

    let path = "/subscriptions/sub/resourceGroups/group1/providers/Microsoft.Compute/availabilitySets/aset1";
    assert!(mock.resource(path).await.is_none());

    let ret = reconciler
        .absent(&ctx, &AVAILABILITY_SET, &aset1(), None)
        .await
        .unwrap();
    assert_eq!(ret.result, Some(true));
    assert_eq!(ret.comment, "Availability set aset1 was not found.");
    assert!(ret.changes.is_empty());
}

#[tokio::test]
async fn test_present_is_idempotent() {
    let (mock, reconciler) = setup(MockTransport::new()).await;
    let ctx = ctx();
    let desired = params(json!({
        "platform_fault_domain_count": 2,
        "platform_update_domain_count": 5,
        "sku": "Aligned",
        "tags": {"env": "prod"}
    }));

    let first = reconciler
        .present(&ctx, &AVAILABILITY_SET, &aset1(), &desired, None)
        .await
        .unwrap();
    assert_eq!(first.result, Some(true));
    let mutations = mock.mutation_count().await;

    let second = reconciler
        .present(&ctx, &AVAILABILITY_SET, &aset1(), &desired, None)
        .await
        .unwrap();
    assert_eq!(second.result, Some(true));
    assert!(second.changes.is_empty());
    assert_eq!(second.comment, "Availability set aset1 is already present.");
    assert_eq!(mock.mutation_count().await, mutations);
}

#[tokio::test]
async fn test_single_field_difference() {
    let (_mock, reconciler) = setup(MockTransport::new()).await;
    let ctx = ctx();

    reconciler
        .present(
            &ctx,
            &AVAILABILITY_SET,
            &aset1(),
            &params(json!({"platform_fault_domain_count": 3, "sku": "aligned"})),
            None,
        )
        .await
        .unwrap();

    let ret = reconciler
        .present(
            &ctx,
            &AVAILABILITY_SET,
            &aset1(),
            &params(json!({"platform_fault_domain_count": 2, "sku": "ALIGNED"})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(ret.result, Some(true));
    assert_eq!(ret.comment, "Availability set aset1 has been updated.");
    assert_eq!(
        Value::Object(ret.changes),
        json!({"platform_fault_domain_count": {"old": 3, "new": 2}})
    );

    let current = reconciler
        .exec()
        .get(&Call::new(profile()), &AVAILABILITY_SET, &aset1())
        .await
        .unwrap();
    assert_eq!(current["platform_fault_domain_count"], 2);
}

#[tokio::test]
async fn test_dry_run_never_mutates() {
    let (mock, reconciler) = setup(MockTransport::new()).await;
    let dry = ctx().with_test(true);
    let desired = params(json!({"platform_fault_domain_count": 3}));

    let ret = reconciler
        .present(&dry, &AVAILABILITY_SET, &aset1(), &desired, None)
        .await
        .unwrap();
    assert_eq!(ret.result, None);
    assert_eq!(ret.comment, "Availability set aset1 would be created.");
    assert_eq!(ret.changes["new"]["platform_fault_domain_count"], 3);
    assert_eq!(mock.mutation_count().await, 0);

    reconciler
        .present(&ctx(), &AVAILABILITY_SET, &aset1(), &desired, None)
        .await
        .unwrap();
    let mutations = mock.mutation_count().await;

    let ret = reconciler
        .present(&dry, &AVAILABILITY_SET, &aset1(), &desired, None)
        .await
        .unwrap();
    assert_eq!(ret.result, Some(true));

    let ret = reconciler
        .present(
            &dry,
            &AVAILABILITY_SET,
            &aset1(),
            &params(json!({"platform_fault_domain_count": 1})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(ret.result, None);
    assert_eq!(ret.comment, "Availability set aset1 would be updated.");

    let ret = reconciler
        .absent(&dry, &AVAILABILITY_SET, &aset1(), None)
        .await
        .unwrap();
    assert_eq!(ret.result, None);
    assert_eq!(ret.comment, "Availability set aset1 would be deleted.");
    assert_eq!(ret.changes["new"], json!({}));

    assert_eq!(mock.mutation_count().await, mutations);
}

#[tokio::test]
async fn test_tags_ignore_order() {
    let (_mock, reconciler) = setup(MockTransport::new()).await;
    let ctx = ctx();
    let target = Target::new("group2");

    reconciler
        .present(
            &ctx,
            &RESOURCE_GROUP,
            &target,
            &params(json!({"location": "eastus", "tags": {"a": "1", "b": "2"}})),
            None,
        )
        .await
        .unwrap();

    let ret = reconciler
        .present(
            &ctx,
            &RESOURCE_GROUP,
            &target,
            &params(json!({"location": "eastus", "tags": {"b": "2", "a": "1"}})),
            None,
        )
        .await
        .unwrap();
    assert!(ret.changes.is_empty());

    let ret = reconciler
        .present(
            &ctx,
            &RESOURCE_GROUP,
            &target,
            &params(json!({"location": "eastus", "tags": {"a": "1"}})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(ret.result, Some(true));
    assert_eq!(
        Value::Object(ret.changes),
        json!({"tags": {"old": {"a": "1", "b": "2"}, "new": {"a": "1"}}})
    );
}

#[tokio::test]
async fn test_vm_names_compare_to_ids() {
    let (mock, reconciler) = setup(MockTransport::new()).await;
    let ctx = ctx();
    mock.set_resource(
        "/subscriptions/sub/resourceGroups/group1/providers/Microsoft.Compute/virtualMachines/VM1",
        json!({"location": "westus2"}),
    )
    .await;

    reconciler
        .present(
            &ctx,
            &AVAILABILITY_SET,
            &aset1(),
            &params(json!({"virtual_machines": ["VM1"]})),
            None,
        )
        .await
        .unwrap();

    let ret = reconciler
        .present(
            &ctx,
            &AVAILABILITY_SET,
            &aset1(),
            &params(json!({"virtual_machines": ["vm1"]})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(ret.result, Some(true));
    assert!(ret.changes.is_empty());
}

#[tokio::test]
async fn test_failed_mutations_report_no_changes() {
    let mut mock = MockTransport::new();
    mock.put_error = Some(CloudError::new(
        Some(409),
        "OperationNotAllowed",
        "Fault domain count is not supported in this region.",
    ));
    mock.delete_error = Some(CloudError::new(Some(409), "Conflict", "resource is locked"));
    let (mock, reconciler) = setup(mock).await;
    let ctx = ctx();

    let ret = reconciler
        .present(
            &ctx,
            &AVAILABILITY_SET,
            &aset1(),
            &params(json!({"platform_fault_domain_count": 3})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(ret.result, Some(false));
    assert!(ret.changes.is_empty());
    assert_eq!(
        ret.comment,
        "Failed to create availability set aset1! ((OperationNotAllowed) Fault domain count is not supported in this region.)"
    );

    let ret = reconciler
        .absent(&ctx, &RESOURCE_GROUP, &Target::new("group1"), None)
        .await
        .unwrap();
    assert_eq!(ret.result, Some(false));
    assert!(ret.changes.is_empty());
    assert_eq!(
        ret.comment,
        "Failed to delete resource group group1! ((Conflict) resource is locked)"
    );
    assert!(mock
        .resource("/subscriptions/sub/resourcegroups/group1")
        .await
        .is_some());
}

#[tokio::test]
async fn test_model_errors_fail_the_state() {
    let (mock, reconciler) = setup(MockTransport::new()).await;

    let ret = reconciler
        .present(
            &ctx(),
            &AVAILABILITY_SET,
            &aset1(),
            &params(json!({"platform_fault_domain_count": {"many": true}})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(ret.result, Some(false));
    assert!(ret
        .comment
        .starts_with("Failed to create availability set aset1! (The object model could not be built."));
    assert_eq!(mock.mutation_count().await, 0);
}

#[tokio::test]
async fn test_connection_auth_overrides_context() {
    let (mock, reconciler) = setup(MockTransport::new()).await;
    let explicit = Profile {
        subscription_id: Some("sub2".to_string()),
        ..Default::default()
    };

    let ret = reconciler
        .present(
            &ctx(),
            &RESOURCE_GROUP,
            &Target::new("group9"),
            &params(json!({"location": "eastus"})),
            Some(&explicit),
        )
        .await
        .unwrap();
    assert_eq!(ret.result, Some(true));
    assert!(mock
        .resource("/subscriptions/sub2/resourcegroups/group9")
        .await
        .is_some());
    assert!(mock
        .resource("/subscriptions/sub/resourcegroups/group9")
        .await
        .is_none());
}

#[tokio::test]
async fn test_credential_errors_are_fatal() {
    let mut mock = MockTransport::new();
    mock.token_error = Some("AADSTS7000215: Invalid client secret provided.".to_string());
    let (_mock, reconciler) = setup(mock).await;

    let err = reconciler
        .present(&ctx(), &AVAILABILITY_SET, &aset1(), &Map::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AzurermError::Authentication(AuthError::TokenRequest { .. })));

    let incomplete = Profile::new(SUB).with_service_principal("client", "", "tenant");
    let err = reconciler
        .absent(&Context::new(incomplete), &AVAILABILITY_SET, &aset1(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AzurermError::Authentication(AuthError::IncompleteServicePrincipal)
    ));
}

#[tokio::test]
async fn test_paged_list_and_async_delete() {
    let (_mock, reconciler) = setup(MockTransport::new().with_page_size(2).with_async_deletes(3)).await;
    let exec = reconciler.exec();
    let call = Call::new(profile());

    for name in ["a.com", "b.com", "c.com", "d.com", "e.com"] {
        exec.create_or_update(&call, &DNS_ZONE, &Target::in_group(name, "group1"), &Map::new())
            .await
            .unwrap();
    }

    let zones = exec.list(&call, &DNS_ZONE, Some("group1")).await.unwrap();
    assert_eq!(zones.len(), 5);
    assert_eq!(zones["c.com"]["zone_type"], "Public");

    let ret = reconciler
        .absent(&ctx(), &DNS_ZONE, &Target::in_group("c.com", "group1"), None)
        .await
        .unwrap();
    assert_eq!(ret.result, Some(true));
    assert_eq!(exec.list(&call, &DNS_ZONE, None).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_type_specific_operations() {
    let (_mock, reconciler) = setup(MockTransport::new()).await;
    let exec = reconciler.exec();
    let call = Call::new(profile());

    assert!(resource_group::check_existence(exec, &call, "group1").await.unwrap());
    assert!(!resource_group::check_existence(exec, &call, "group7").await.unwrap());

    exec.create_or_update(&call, &AVAILABILITY_SET, &aset1(), &Map::new())
        .await
        .unwrap();
    let sizes = availability_set::list_available_sizes(exec, &call, "aset1", "group1")
        .await
        .unwrap();
    assert!(sizes.contains_key("Standard_D2s_v3"));
    assert_eq!(sizes["Standard_D2s_v3"]["number_of_cores"], 2);

    let err = availability_set::list_available_sizes(exec, &call, "missing", "group1")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let subscriptions = subscription::list(exec, &call).await.unwrap();
    assert_eq!(
        subscriptions[MOCK_SUBSCRIPTION_ID]["display_name"],
        "Mock Subscription"
    );
}
