//! Azure cloud environments and endpoint discovery.

use crate::transport::{Method, Request, Transport};
use crate::{AzurermError, Result};
use serde_json::Value;

/// Endpoint set for one Azure cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Cloud name
    pub name: String,
    /// Resource Manager base URL
    pub resource_manager: String,
    /// Active Directory login endpoint
    pub active_directory: String,
    /// Token audience for management-plane calls
    pub management_audience: String,
}

impl Endpoints {
    /// Scope to request in OAuth2 v2 token grants.
    pub fn management_scope(&self) -> String {
        format!("{}.default", with_trailing_slash(&self.management_audience))
    }

    /// Login endpoint for a tenant, e.g. `https://login.microsoftonline.com/<tenant>`.
    pub fn authority(&self, tenant: &str) -> String {
        format!("{}{}", with_trailing_slash(&self.active_directory), tenant)
    }

    /// Joins an ARM path onto the resource manager base.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.resource_manager.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Known cloud environments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudEnvironment {
    /// `AZURE_PUBLIC_CLOUD`
    Public,
    /// `AZURE_CHINA_CLOUD`
    China,
    /// `AZURE_US_GOV_CLOUD`
    UsGovernment,
    /// `AZURE_GERMAN_CLOUD`
    German,
    /// Discovered from a metadata endpoint URL
    Custom(String),
}

impl std::str::FromStr for CloudEnvironment {
    type Err = AzurermError;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("http") {
            return Ok(Self::Custom(s.to_string()));
        }
        match s {
            "AZURE_PUBLIC_CLOUD" => Ok(Self::Public),
            "AZURE_CHINA_CLOUD" => Ok(Self::China),
            "AZURE_US_GOV_CLOUD" => Ok(Self::UsGovernment),
            "AZURE_GERMAN_CLOUD" => Ok(Self::German),
            other => Err(AzurermError::Config(format!(
                "the Azure cloud environment {} is not available",
                other
            ))),
        }
    }
}

impl std::fmt::Display for CloudEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "AZURE_PUBLIC_CLOUD"),
            Self::China => write!(f, "AZURE_CHINA_CLOUD"),
            Self::UsGovernment => write!(f, "AZURE_US_GOV_CLOUD"),
            Self::German => write!(f, "AZURE_GERMAN_CLOUD"),
            Self::Custom(url) => write!(f, "{}", url),
        }
    }
}

impl CloudEnvironment {
    /// Endpoints for the fixed clouds. `None` for custom clouds, whose
    /// endpoints must be discovered.
    pub fn known_endpoints(&self) -> Option<Endpoints> {
        let (rm, ad, audience) = match self {
            Self::Public => (
                "https://management.azure.com/",
                "https://login.microsoftonline.com/",
                "https://management.core.windows.net/",
            ),
            Self::China => (
                "https://management.chinacloudapi.cn/",
                "https://login.chinacloudapi.cn/",
                "https://management.core.chinacloudapi.cn/",
            ),
            Self::UsGovernment => (
                "https://management.usgovcloudapi.net/",
                "https://login.microsoftonline.us/",
                "https://management.core.usgovcloudapi.net/",
            ),
            Self::German => (
                "https://management.microsoftazure.de/",
                "https://login.microsoftonline.de/",
                "https://management.core.cloudapi.de/",
            ),
            Self::Custom(_) => return None,
        };

        Some(Endpoints {
            name: self.to_string(),
            resource_manager: rm.to_string(),
            active_directory: ad.to_string(),
            management_audience: audience.to_string(),
        })
    }
}

/// Public cloud endpoints.
pub fn public_endpoints() -> Endpoints {
    Endpoints {
        name: "AZURE_PUBLIC_CLOUD".to_string(),
        resource_manager: "https://management.azure.com/".to_string(),
        active_directory: "https://login.microsoftonline.com/".to_string(),
        management_audience: "https://management.core.windows.net/".to_string(),
    }
}

/// Resolves a `cloud_environment` setting to an endpoint set.
///
/// Never fails: unknown names and failed metadata discovery are logged and
/// fall back to the public cloud.
pub async fn resolve_endpoints(transport: &dyn Transport, setting: Option<&str>) -> Endpoints {
    let setting = match setting {
        Some(s) if !s.is_empty() => s,
        _ => return public_endpoints(),
    };

    let cloud = match setting.parse::<CloudEnvironment>() {
        Ok(cloud) => cloud,
        Err(e) => {
            tracing::error!("Unknown cloud_environment presented: {}", e);
            return public_endpoints();
        }
    };

    if let Some(endpoints) = cloud.known_endpoints() {
        return endpoints;
    }

    match discover(transport, setting).await {
        Ok(endpoints) => {
            tracing::debug!(cloud = %setting, "discovered cloud endpoints from metadata");
            endpoints
        }
        Err(e) => {
            tracing::error!(
                "Unable to discover cloud endpoints from {}, using AZURE_PUBLIC_CLOUD: {}",
                setting,
                e
            );
            public_endpoints()
        }
    }
}

async fn discover(transport: &dyn Transport, metadata_url: &str) -> Result<Endpoints> {
    let url = format!(
        "{}/metadata/endpoints?api-version=2015-01-01",
        metadata_url.trim_end_matches('/')
    );
    let response = transport.send(Request::new(Method::Get, url)).await?;

    if !response.is_success() {
        return Err(AzurermError::Config(format!(
            "metadata endpoint returned status {}",
            response.status
        )));
    }

    let body = response
        .body
        .ok_or_else(|| AzurermError::Config("metadata endpoint returned no body".to_string()))?;
    parse_metadata(metadata_url, &body)
}

fn parse_metadata(metadata_url: &str, body: &Value) -> Result<Endpoints> {
    let auth = body
        .get("authentication")
        .ok_or_else(|| AzurermError::Config("metadata is missing 'authentication'".to_string()))?;

    let login = auth
        .get("loginEndpoint")
        .and_then(Value::as_str)
        .ok_or_else(|| AzurermError::Config("metadata is missing 'loginEndpoint'".to_string()))?;

    let audience = auth
        .get("audiences")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(Value::as_str)
        .ok_or_else(|| AzurermError::Config("metadata is missing 'audiences'".to_string()))?;

    Ok(Endpoints {
        name: metadata_url.to_string(),
        resource_manager: with_trailing_slash(metadata_url),
        active_directory: with_trailing_slash(login),
        management_audience: with_trailing_slash(audience),
    })
}
