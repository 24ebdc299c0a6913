//! Present/absent run of an availability set against the mock transport.

use azurerm_state::exec::Exec;
use azurerm_state::resources::{Target, AVAILABILITY_SET};
use azurerm_state::transports::mock::MockTransport;
use azurerm_state::{ClientFactory, Context, Profile, Reconciler, StateReturn};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn show(ret: &StateReturn) -> azurerm_state::Result<()> {
    println!("{}", serde_json::to_string_pretty(ret)?);
    Ok(())
}

#[tokio::main]
async fn main() -> azurerm_state::Result<()> {
    let mock = Arc::new(MockTransport::new());
    mock.set_resource("/subscriptions/sub/resourcegroups/group1", json!({"location": "westus2"}))
        .await;

    let reconciler = Reconciler::new(Exec::new(ClientFactory::new(mock.clone())));
    let ctx = Context::new(Profile::new("sub").with_service_principal("app-id", "secret", "tenant"));
    let target = Target::in_group("aset1", "group1");

    let desired: Map<String, Value> = [
        ("platform_fault_domain_count".to_string(), json!(3)),
        ("sku".to_string(), json!("aligned")),
        ("tags".to_string(), json!({"contact_name": "Elmer Fudd Gantry"})),
    ]
    .into_iter()
    .collect();

    println!("Creating availability set...");
    show(&reconciler.present(&ctx, &AVAILABILITY_SET, &target, &desired, None).await?)?;

    println!("\nRunning again (no changes expected)...");
    show(&reconciler.present(&ctx, &AVAILABILITY_SET, &target, &desired, None).await?)?;

    println!("\nPreviewing a fault domain change...");
    let mut smaller = desired.clone();
    smaller.insert("platform_fault_domain_count".to_string(), json!(2));
    show(
        &reconciler
            .present(&ctx.clone().with_test(true), &AVAILABILITY_SET, &target, &smaller, None)
            .await?,
    )?;

    println!("\nDeleting availability set...");
    show(&reconciler.absent(&ctx, &AVAILABILITY_SET, &target, None).await?)?;

    println!("\nMutating requests sent: {}", mock.mutation_count().await);
    Ok(())
}
