//! Idempotent `present` / `absent` states.
//!
//! A state fetches the current descriptor, diffs it against the desired
//! parameters and only then mutates. Cloud and object-model failures are
//! folded into a failed [`StateReturn`]; fatal errors (credentials,
//! configuration) are returned as `Err`.

use crate::diff::field_changes;
use crate::exec::Exec;
use crate::resources::{ResourceType, Target};
use crate::{Call, Context, ExecError, LogLevel, Profile, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const MISSING_CONNECTION: &str =
    "Connection information must be specified via acct or connection_auth dictionary!";

/// Outcome of a state invocation.
///
/// `result` is `Some(true)` on success, `Some(false)` on failure and `None`
/// in dry-run mode when something would change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateReturn {
    /// Name of the resource the state addressed
    pub name: String,
    /// Outcome
    pub result: Option<bool>,
    /// Human-readable summary
    pub comment: String,
    /// What changed (or would change)
    pub changes: Map<String, Value>,
}

impl StateReturn {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            result: Some(false),
            comment: String::new(),
            changes: Map::new(),
        }
    }
}

enum Lookup {
    Found(Map<String, Value>),
    Missing,
    Failed(String),
}

/// Drives resources to a desired state through an [`Exec`].
///
/// # Example
///
/// ```no_run
/// use azurerm_state::exec::Exec;
/// use azurerm_state::factory::ClientFactory;
/// use azurerm_state::resources::{Target, AVAILABILITY_SET};
/// use azurerm_state::state::Reconciler;
/// use azurerm_state::{Context, Profile};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> azurerm_state::Result<()> {
///     let reconciler = Reconciler::new(Exec::new(ClientFactory::from_registry("http")?));
///     let ctx = Context::new(Profile::new("sub-id").with_service_principal("app", "secret", "tenant"));
///
///     let desired = json!({"platform_fault_domain_count": 3, "sku": "aligned"});
///     let ret = reconciler
///         .present(
///             &ctx,
///             &AVAILABILITY_SET,
///             &Target::in_group("aset1", "group1"),
///             desired.as_object().unwrap(),
///             None,
///         )
///         .await?;
///     println!("{}", ret.comment);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Reconciler {
    exec: Exec,
}

impl Reconciler {
    /// Creates a reconciler.
    pub fn new(exec: Exec) -> Self {
        Self { exec }
    }

    /// Returns the underlying exec surface.
    pub fn exec(&self) -> &Exec {
        &self.exec
    }

    /// Ensures a resource exists with the desired parameters.
    ///
    /// # Errors
    ///
    /// Only fatal errors (credential resolution, configuration) are
    /// returned; everything else is reported through the [`StateReturn`].
    pub async fn present(
        &self,
        ctx: &Context,
        kind: &ResourceType,
        target: &Target,
        desired: &Map<String, Value>,
        connection_auth: Option<&Profile>,
    ) -> Result<StateReturn> {
        let mut ret = StateReturn::new(&target.name);
        let profile = match ctx.profile_for(connection_auth) {
            Some(profile) => profile,
            None => {
                ret.comment = MISSING_CONNECTION.to_string();
                return Ok(ret);
            }
        };
        let call = Call::new(profile);

        let wanted = kind.normalized(desired);
        let action = match self.lookup(&call, kind, target).await? {
            Lookup::Failed(comment) => {
                ret.comment = comment;
                return Ok(ret);
            }
            Lookup::Found(current) => {
                let changes = match field_changes(kind.compare, &current, &wanted) {
                    Ok(changes) => changes,
                    Err(comment) => {
                        ret.comment = comment;
                        return Ok(ret);
                    }
                };

                if changes.is_empty() {
                    ret.result = Some(true);
                    ret.comment = format!("{} {} is already present.", kind.display, target.name);
                    return Ok(ret);
                }

                ret.changes = changes;
                if ctx.test {
                    ret.result = None;
                    ret.comment = format!("{} {} would be updated.", kind.display, target.name);
                    return Ok(ret);
                }
                "update"
            }
            Lookup::Missing => {
                let mut new = Map::new();
                new.insert("name".to_string(), json!(target.name));
                if let Some(group) = &target.resource_group {
                    new.insert("resource_group".to_string(), json!(group));
                }
                new.extend(wanted);

                ret.changes.insert("old".to_string(), json!({}));
                ret.changes.insert("new".to_string(), Value::Object(new));
                if ctx.test {
                    ret.result = None;
                    ret.comment = format!("{} {} would be created.", kind.display, target.name);
                    return Ok(ret);
                }
                "create"
            }
        };

        match self.exec.create_or_update(&call, kind, target, desired).await {
            Ok(_) => {
                ret.result = Some(true);
                ret.comment = format!("{} {} has been {}d.", kind.display, target.name, action);
            }
            Err(ExecError::Fatal(err)) => return Err(err),
            Err(err) => {
                ret.changes.clear();
                ret.comment = format!("Failed to {} {} {}! ({})", action, kind.noun, target.name, err);
            }
        }
        Ok(ret)
    }

    /// Ensures a resource does not exist.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned, as with [`Reconciler::present`].
    pub async fn absent(
        &self,
        ctx: &Context,
        kind: &ResourceType,
        target: &Target,
        connection_auth: Option<&Profile>,
    ) -> Result<StateReturn> {
        let mut ret = StateReturn::new(&target.name);
        let profile = match ctx.profile_for(connection_auth) {
            Some(profile) => profile,
            None => {
                ret.comment = MISSING_CONNECTION.to_string();
                return Ok(ret);
            }
        };
        let call = Call::new(profile);

        let current = match self.lookup(&call, kind, target).await? {
            Lookup::Found(current) => current,
            Lookup::Missing => {
                ret.result = Some(true);
                ret.comment = format!("{} {} was not found.", kind.display, target.name);
                return Ok(ret);
            }
            Lookup::Failed(comment) => {
                ret.comment = comment;
                return Ok(ret);
            }
        };

        ret.changes.insert("old".to_string(), Value::Object(current));
        ret.changes.insert("new".to_string(), json!({}));
        if ctx.test {
            ret.result = None;
            ret.comment = format!("{} {} would be deleted.", kind.display, target.name);
            return Ok(ret);
        }

        match self.exec.delete(&call, kind, target).await {
            Ok(_) => {
                ret.result = Some(true);
                ret.comment = format!("{} {} has been deleted.", kind.display, target.name);
            }
            Err(ExecError::Fatal(err)) => return Err(err),
            Err(err) => {
                ret.changes.clear();
                ret.comment = format!("Failed to delete {} {}! ({})", kind.noun, target.name, err);
            }
        }
        Ok(ret)
    }

    /// Fetches the current descriptor. A missing resource is an expected
    /// outcome, so lookups log cloud errors at `INFO`.
    async fn lookup(&self, call: &Call, kind: &ResourceType, target: &Target) -> Result<Lookup> {
        let call = call.clone().with_log_level(LogLevel::Info);
        match self.exec.get(&call, kind, target).await {
            Ok(current) => Ok(Lookup::Found(current)),
            Err(err) if err.is_not_found() => Ok(Lookup::Missing),
            Err(ExecError::Fatal(err)) => Err(err),
            Err(err) => Ok(Lookup::Failed(format!(
                "Failed to get {} {}! ({})",
                kind.noun, target.name, err
            ))),
        }
    }
}
