//! Connection profiles, per-call options and the reconciliation context.

use crate::{AzurermError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Provider key under which profiles live in account files.
pub const PROVIDER: &str = "azurerm";

/// Connection profile for Azure Resource Manager.
///
/// Every field is optional; which combination is populated decides the
/// credential type (see [`credential::resolve`](crate::credential::resolve)).
/// A field that is present but empty is distinct from an absent one.
///
/// ```
/// use azurerm_state::Profile;
///
/// let profile = Profile::new("3287abc8-f98a-c678-3bde-326766fd3617")
///     .with_service_principal("client", "secret", "tenant")
///     .with_cloud_environment("AZURE_US_GOV_CLOUD");
/// assert_eq!(profile.tenant.as_deref(), Some("tenant"));
/// ```
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Subscription the management clients are bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// Directory (tenant) id for service principals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    /// Service principal application id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Service principal secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// User principal name for password authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password for password authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Cloud name (`AZURE_PUBLIC_CLOUD`, ...) or a metadata endpoint URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_environment: Option<String>,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Profile")
            .field("subscription_id", &self.subscription_id)
            .field("tenant", &self.tenant)
            .field("client_id", &self.client_id)
            .field("secret", &redact(&self.secret))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("cloud_environment", &self.cloud_environment)
            .finish()
    }
}

impl Profile {
    /// Creates a profile bound to a subscription.
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: Some(subscription_id.into()),
            ..Default::default()
        }
    }

    /// Sets service principal credentials.
    pub fn with_service_principal(
        mut self,
        client_id: impl Into<String>,
        secret: impl Into<String>,
        tenant: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.secret = Some(secret.into());
        self.tenant = Some(tenant.into());
        self
    }

    /// Sets username/password credentials.
    pub fn with_user_password(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the cloud environment name or metadata URL.
    pub fn with_cloud_environment(mut self, cloud: impl Into<String>) -> Self {
        self.cloud_environment = Some(cloud.into());
        self
    }

    /// Returns a profile with this profile's fields taking precedence over
    /// `base` wherever both are set.
    pub fn merged_over(&self, base: &Profile) -> Profile {
        fn pick(explicit: &Option<String>, fallback: &Option<String>) -> Option<String> {
            explicit.clone().or_else(|| fallback.clone())
        }

        Profile {
            subscription_id: pick(&self.subscription_id, &base.subscription_id),
            tenant: pick(&self.tenant, &base.tenant),
            client_id: pick(&self.client_id, &base.client_id),
            secret: pick(&self.secret, &base.secret),
            username: pick(&self.username, &base.username),
            password: pick(&self.password, &base.password),
            cloud_environment: pick(&self.cloud_environment, &base.cloud_environment),
        }
    }

    /// Builds a profile from loose string parameters, e.g. secrets pulled out
    /// of a vault. Unknown parameter names are ignored.
    pub fn from_params(params: &BTreeMap<String, String>) -> Self {
        let mut profile = Profile::default();
        for (key, value) in params {
            let slot = match key.as_str() {
                "subscription_id" => &mut profile.subscription_id,
                "tenant" => &mut profile.tenant,
                "client_id" => &mut profile.client_id,
                "secret" => &mut profile.secret,
                "username" => &mut profile.username,
                "password" => &mut profile.password,
                "cloud_environment" => &mut profile.cloud_environment,
                other => {
                    tracing::debug!(parameter = other, "ignoring unknown profile parameter");
                    continue;
                }
            };
            *slot = Some(value.clone());
        }
        profile
    }
}

/// Named connection profiles, as found under the `azurerm:` key of an
/// account file.
///
/// ```
/// use azurerm_state::Accounts;
///
/// let accounts = Accounts::from_yaml_str(r#"
/// azurerm:
///   default:
///     subscription_id: 3287abc8-f98a-c678-3bde-326766fd3617
///     username: fletch
///     password: 123pass
/// "#).unwrap();
/// assert!(accounts.profile("default").is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accounts {
    #[serde(rename = "azurerm", default)]
    profiles: BTreeMap<String, Profile>,
}

impl Accounts {
    /// Parses accounts from JSON.
    pub fn from_json_str(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Parses accounts from YAML.
    pub fn from_yaml_str(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Loads accounts from a `.json`, `.yaml` or `.yml` file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&data),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&data),
            _ => Err(AzurermError::Config(format!(
                "unsupported account file extension: {}",
                path.display()
            ))),
        }
    }

    /// Returns a named profile.
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Returns the `default` profile.
    pub fn default_profile(&self) -> Option<&Profile> {
        self.profile("default")
    }

    /// Adds or replaces a profile.
    pub fn insert(&mut self, name: impl Into<String>, profile: Profile) {
        self.profiles.insert(name.into(), profile);
    }

    /// Profile names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Merges per-profile parameter maps into the store. Values already
    /// present in an existing profile are kept.
    pub fn merge_params(&mut self, params: &BTreeMap<String, BTreeMap<String, String>>) {
        for (name, values) in params {
            let incoming = Profile::from_params(values);
            let merged = match self.profiles.get(name) {
                Some(existing) => existing.merged_over(&incoming),
                None => incoming,
            };
            self.profiles.insert(name.clone(), merged);
        }
    }
}

/// Level at which caught cloud errors are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// `TRACE`
    Trace,
    /// `DEBUG`
    Debug,
    /// `INFO`
    Info,
    /// `WARN`
    Warn,
    /// `ERROR` (default)
    #[default]
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = AzurermError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(AzurermError::Config(format!("unknown log level: {}", other))),
        }
    }
}

/// Per-call options for exec operations.
#[derive(Debug, Clone, Default)]
pub struct Call {
    /// Connection profile for this call
    pub profile: Profile,
    /// Level used when logging caught cloud errors
    pub log_level: LogLevel,
}

impl Call {
    /// Creates call options for a profile, logging cloud errors at `ERROR`.
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            log_level: LogLevel::Error,
        }
    }

    /// Sets the cloud error log level.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }
}

/// Reconciliation context shared by every state invocation in a run.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Dry-run: compute changes but never mutate.
    pub test: bool,
    /// Profile selected for the run, used when a state receives no explicit
    /// connection profile.
    pub acct: Option<Profile>,
}

impl Context {
    /// Creates a context bound to a profile.
    pub fn new(acct: Profile) -> Self {
        Self {
            test: false,
            acct: Some(acct),
        }
    }

    /// Enables or disables dry-run mode.
    pub fn with_test(mut self, test: bool) -> Self {
        self.test = test;
        self
    }

    /// Resolves the profile for one invocation: explicit fields over the
    /// context profile. Returns `None` when neither is available.
    pub fn profile_for(&self, explicit: Option<&Profile>) -> Option<Profile> {
        match (explicit, &self.acct) {
            (Some(explicit), Some(acct)) => Some(explicit.merged_over(acct)),
            (Some(explicit), None) => Some(explicit.clone()),
            (None, Some(acct)) => Some(acct.clone()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_profile_builder() {
        let profile = Profile::new("sub")
            .with_user_password("fletch", "123pass")
            .with_cloud_environment("AZURE_CHINA_CLOUD");

        assert_eq!(profile.subscription_id.as_deref(), Some("sub"));
        assert_eq!(profile.username.as_deref(), Some("fletch"));
        assert_eq!(profile.cloud_environment.as_deref(), Some("AZURE_CHINA_CLOUD"));
    }

    #[test]
    fn test_explicit_fields_take_precedence() {
        let acct = Profile::new("acct-sub").with_service_principal("acct-client", "s", "t");
        let explicit = Profile {
            subscription_id: Some("explicit-sub".to_string()),
            ..Default::default()
        };

        let merged = explicit.merged_over(&acct);
        assert_eq!(merged.subscription_id.as_deref(), Some("explicit-sub"));
        assert_eq!(merged.client_id.as_deref(), Some("acct-client"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let profile = Profile::new("sub").with_service_principal("client", "hunter2", "tenant");
        let rendered = format!("{:?}", profile);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_accounts_from_json() {
        let accounts = Accounts::from_json_str(
            r#"{"azurerm": {"default": {"subscription_id": "sub", "tenant": "t",
                "client_id": "c", "secret": "s"}}}"#,
        )
        .unwrap();

        let profile = accounts.default_profile().unwrap();
        assert_eq!(profile.client_id.as_deref(), Some("c"));
        assert_eq!(accounts.names().collect::<Vec<_>>(), vec!["default"]);
    }

    #[tokio::test]
    async fn test_accounts_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("acct.yml");
        tokio::fs::write(
            &path,
            "azurerm:\n  user_pass_auth:\n    subscription_id: sub\n    username: u\n    password: p\n",
        )
        .await
        .unwrap();

        let accounts = Accounts::from_path(&path).await.unwrap();
        let profile = accounts.profile("user_pass_auth").unwrap();
        assert_eq!(profile.password.as_deref(), Some("p"));

        let bad = dir.path().join("acct.ini");
        tokio::fs::write(&bad, "").await.unwrap();
        assert!(matches!(
            Accounts::from_path(&bad).await,
            Err(AzurermError::Config(_))
        ));
    }

    #[test]
    fn test_merge_params_keeps_existing_values() {
        let mut accounts = Accounts::default();
        accounts.insert("default", Profile::new("file-sub"));

        let mut values = BTreeMap::new();
        values.insert("subscription_id".to_string(), "vault-sub".to_string());
        values.insert("tenant".to_string(), "vault-tenant".to_string());
        values.insert("bogus".to_string(), "x".to_string());
        let mut params = BTreeMap::new();
        params.insert("default".to_string(), values);

        accounts.merge_params(&params);
        let profile = accounts.default_profile().unwrap();
        assert_eq!(profile.subscription_id.as_deref(), Some("file-sub"));
        assert_eq!(profile.tenant.as_deref(), Some("vault-tenant"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::default(), LogLevel::Error);
    }

    #[test]
    fn test_context_profile_resolution() {
        let ctx = Context::default();
        assert!(ctx.profile_for(None).is_none());

        let ctx = Context::new(Profile::new("acct")).with_test(true);
        assert!(ctx.test);
        assert_eq!(
            ctx.profile_for(None).unwrap().subscription_id.as_deref(),
            Some("acct")
        );

        let explicit = Profile::new("explicit");
        assert_eq!(
            ctx.profile_for(Some(&explicit))
                .unwrap()
                .subscription_id
                .as_deref(),
            Some("explicit")
        );
    }
}
