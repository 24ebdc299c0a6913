//! azurerm-state - Declarative state reconciliation for Azure Resource Manager.
//!
//! Every supported resource type gets two surfaces over one generic pattern:
//! an *exec* surface that performs a single ARM operation and normalizes the
//! outcome into a typed result, and a *state* surface that fetches the
//! current descriptor, diffs it against the desired parameters and only then
//! creates, updates or deletes.
//!
//! # Features
//!
//! - **Credential resolution**: service principal, username/password or
//!   managed identity, picked from whichever profile fields are populated
//! - **Sovereign clouds**: public, China, US Government, German, or a custom
//!   cloud discovered from its metadata endpoint
//! - **Schema-driven payloads**: flat snake_case parameters in, ARM wire JSON
//!   out, and back again
//! - **Idempotent states**: per-field comparators so repeated runs report no
//!   changes, plus a dry-run mode
//! - **Pluggable transport**: reqwest in production, an in-memory ARM for
//!   tests
//!
//! # Quick Start
//!
//! ```no_run
//! use azurerm_state::exec::Exec;
//! use azurerm_state::factory::ClientFactory;
//! use azurerm_state::resources::{Target, AVAILABILITY_SET};
//! use azurerm_state::state::Reconciler;
//! use azurerm_state::{Accounts, Context};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> azurerm_state::Result<()> {
//!     let accounts = Accounts::from_path("acct.yml").await?;
//!     let profile = accounts.default_profile().cloned().unwrap_or_default();
//!     let ctx = Context::new(profile);
//!
//!     let reconciler = Reconciler::new(Exec::new(ClientFactory::from_registry("http")?));
//!     let target = Target::in_group("aset1", "group1");
//!     let desired = json!({"platform_fault_domain_count": 3, "sku": "aligned"});
//!
//!     let ret = reconciler
//!         .present(&ctx, &AVAILABILITY_SET, &target, desired.as_object().unwrap(), None)
//!         .await?;
//!     println!("{}: {}", ret.name, ret.comment);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! | Feature | Default | Notes |
//! |---------|---------|-------|
//! | `mock` | yes | In-memory ARM transport for testing |
//! | `azure` | no | Key Vault profile source (SDK-based) |
//!
//! ```toml
//! [dependencies]
//! azurerm-state = { version = "0.1", features = ["azure"] }
//! ```

pub mod error;
pub mod config;
pub mod transport;
pub mod cloud;
pub mod session;
pub mod credential;
pub mod factory;
pub mod client;
pub mod pager;
pub mod model;
pub mod validation;
pub mod diff;
pub mod exec;
pub mod state;
pub mod resources;
pub mod transports;
pub mod keyvault;

pub use client::ManagementClient;
pub use config::{Accounts, Call, Context, LogLevel, Profile};
pub use error::{AuthError, AzurermError, CloudError, ExecError, ExecResult, Result};
pub use factory::{ClientFactory, ClientType};
pub use state::{Reconciler, StateReturn};

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the library.
///
/// This registers all compiled transports with the factory. It's called
/// automatically by [`ClientFactory::from_registry`], but can be called
/// explicitly if needed (it's idempotent).
pub fn init() {
    INIT.call_once(transports::register_all);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_initialization() {
        init();
        init();
        assert!(factory::new_transport("http").is_ok());
    }

    #[test]
    fn test_unknown_transport() {
        init();
        let err = ClientFactory::from_registry("carrier-pigeon").unwrap_err();
        assert!(matches!(err, AzurermError::UnknownTransport(_)));
    }
}
