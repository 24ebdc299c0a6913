//! Connection profiles stored as Key Vault secrets.
//!
//! Secrets are named `{designator}{provider}-{profile}-{parameter}`, e.g.
//! `acct-provider-azurerm-default-client-id`. Dashes after the profile
//! segment become underscores, so the secret above populates `client_id` of
//! the `default` profile. Only the latest version of a secret is read, and
//! only secrets whose names match the pattern are fetched.
//!
//! Fetching requires the `azure` feature; name parsing and merging into
//! [`Accounts`] do not.

use crate::cloud::{public_endpoints, CloudEnvironment};
use crate::config::PROVIDER;
use crate::{Accounts, Profile};
use std::collections::BTreeMap;

/// Default secret name prefix.
pub const DEFAULT_DESIGNATOR: &str = "acct-provider-";

/// Profiles found in a vault: `provider -> profile -> parameter -> value`.
pub type VaultProfiles = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// The parts of a profile secret name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretName {
    /// Provider segment (`azurerm`)
    pub provider: String,
    /// Profile segment (`default`)
    pub profile: String,
    /// Parameter name with dashes turned into underscores (`client_id`)
    pub parameter: String,
}

/// Splits a secret name into provider, profile and parameter.
///
/// Returns `None` for names without the designator, and logs an error for
/// names that carry the designator but not three dash-delimited segments.
///
/// ```
/// use azurerm_state::keyvault::{parse_secret_name, DEFAULT_DESIGNATOR};
///
/// let name = parse_secret_name(DEFAULT_DESIGNATOR, "acct-provider-azurerm-default-subscription-id").unwrap();
/// assert_eq!(name.profile, "default");
/// assert_eq!(name.parameter, "subscription_id");
/// ```
pub fn parse_secret_name(designator: &str, name: &str) -> Option<SecretName> {
    let key = name.strip_prefix(designator)?;

    if key.matches('-').count() < 2 {
        tracing::error!(
            "A dash-delimited string is expected after '{}' with the format \
             'PROVIDER-PROFILE-parametername', but got '{}' instead.",
            designator,
            name
        );
        return None;
    }

    let mut parts = key.split('-');
    let provider = parts.next()?.to_string();
    let profile = parts.next()?.to_string();
    let parameter = parts.collect::<Vec<_>>().join("_");

    tracing::debug!(%provider, %profile, %parameter, "found profile secret");
    Some(SecretName {
        provider,
        profile,
        parameter,
    })
}

/// Groups `(secret name, value)` pairs into profiles, skipping names that
/// do not parse.
pub fn collect_profiles<I>(designator: &str, secrets: I) -> VaultProfiles
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut profiles = VaultProfiles::new();
    for (name, value) in secrets {
        if let Some(parsed) = parse_secret_name(designator, &name) {
            profiles
                .entry(parsed.provider)
                .or_default()
                .entry(parsed.profile)
                .or_default()
                .insert(parsed.parameter, value);
        }
    }
    profiles
}

/// Merges the `azurerm` profiles found in a vault into an account store.
/// Values already present in the store win.
pub fn merge_into(accounts: &mut Accounts, profiles: &VaultProfiles) {
    if let Some(found) = profiles.get(PROVIDER) {
        accounts.merge_params(found);
    }
}

/// Authority host used to authenticate against the vault.
///
/// `cloud_environment` may be a cloud name or an `http(s)` URL, which is used
/// as-is. Unknown names are logged and fall back to the public cloud.
pub fn authority_host(cloud_environment: Option<&str>) -> String {
    let setting = match cloud_environment {
        Some(setting) => setting,
        None => return public_endpoints().active_directory,
    };
    if setting.starts_with("http") {
        return setting.to_string();
    }

    match setting.parse::<CloudEnvironment>() {
        Ok(cloud) => cloud
            .known_endpoints()
            .map(|e| e.active_directory)
            .unwrap_or_else(|| public_endpoints().active_directory),
        Err(err) => {
            tracing::error!("Unknown authority presented for \"cloud_environment\": {}", err);
            public_endpoints().active_directory
        }
    }
}

/// A vault holding connection profiles, and the identity used to read it.
#[derive(Debug, Clone)]
pub struct KeyVaultSource {
    vault_url: String,
    designator: String,
    identity: Profile,
}

impl KeyVaultSource {
    /// Creates a source for a vault URL (`https://myvault.vault.azure.net`).
    pub fn new(vault_url: impl Into<String>) -> Self {
        Self {
            vault_url: vault_url.into(),
            designator: DEFAULT_DESIGNATOR.to_string(),
            identity: Profile::default(),
        }
    }

    /// Sets the secret name prefix.
    pub fn with_designator(mut self, designator: impl Into<String>) -> Self {
        self.designator = designator.into();
        self
    }

    /// Sets the identity used to read the vault. Service principal fields
    /// are used when all three are set; otherwise the ambient Azure
    /// credential chain is used.
    pub fn with_identity(mut self, identity: Profile) -> Self {
        self.identity = identity;
        self
    }

    /// Returns the vault URL.
    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    /// Returns the secret name prefix.
    pub fn designator(&self) -> &str {
        &self.designator
    }

    /// Authority host for the vault identity, whichever credential ends up
    /// being used.
    pub fn authority(&self) -> String {
        authority_host(self.identity.cloud_environment.as_deref())
    }
}

#[cfg(feature = "azure")]
mod remote {
    use super::*;
    use azure_core::auth::TokenCredential;
    use azure_identity::{ClientSecretCredential, DefaultAzureCredential, TokenCredentialOptions};
    use azure_security_keyvault::SecretClient;
    use futures::StreamExt;
    use std::sync::Arc;

    impl KeyVaultSource {
        fn credential(&self) -> Result<Arc<dyn TokenCredential>, String> {
            let identity = &self.identity;
            let authority = self.authority();
            match (&identity.client_id, &identity.secret, &identity.tenant) {
                (Some(client_id), Some(secret), Some(tenant)) => {
                    let authority = url::Url::parse(&authority).map_err(|e| e.to_string())?;
                    Ok(Arc::new(ClientSecretCredential::new(
                        azure_core::new_http_client(),
                        authority,
                        tenant.clone(),
                        client_id.clone(),
                        secret.clone(),
                    )))
                }
                _ => {
                    let mut options = TokenCredentialOptions::default();
                    options.set_authority_host(authority);
                    DefaultAzureCredential::create(options)
                        .map(|c| Arc::new(c) as Arc<dyn TokenCredential>)
                        .map_err(|e| e.to_string())
                }
            }
        }

        /// Reads every profile secret in the vault.
        ///
        /// Vault access failures are logged and produce an empty result.
        pub async fn unlock(&self) -> VaultProfiles {
            let client = match self
                .credential()
                .and_then(|c| SecretClient::new(&self.vault_url, c).map_err(|e| e.to_string()))
            {
                Ok(client) => client,
                Err(err) => {
                    tracing::error!("Unable to unlock Azure Key Vault: {}", err);
                    return VaultProfiles::new();
                }
            };

            let mut names = Vec::new();
            let mut pages = client.list_secrets().into_stream();
            while let Some(page) = pages.next().await {
                match page {
                    Ok(page) => names.extend(
                        page.value
                            .iter()
                            .filter_map(|s| s.id.rsplit('/').next())
                            .filter(|name| name.starts_with(&self.designator))
                            .map(str::to_string),
                    ),
                    Err(err) => {
                        tracing::error!("Unable to unlock Azure Key Vault: {}", err);
                        return VaultProfiles::new();
                    }
                }
            }

            let mut secrets = Vec::with_capacity(names.len());
            for name in names {
                if parse_secret_name(&self.designator, &name).is_none() {
                    continue;
                }
                match client.get(name.as_str()).into_future().await {
                    Ok(secret) => secrets.push((name, secret.value)),
                    Err(err) => tracing::error!("Unable to handle secret processing: {}", err),
                }
            }

            collect_profiles(&self.designator, secrets)
        }
    }
}
