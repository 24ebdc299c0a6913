//! Transport registry and management client factory.

use crate::client::ManagementClient;
use crate::cloud::resolve_endpoints;
use crate::credential;
use crate::transport::Transport;
use crate::{AzurermError, Profile, Result};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

/// Factory function type for creating transports.
pub type TransportFactory = fn() -> Result<Arc<dyn Transport>>;

static TRANSPORT_REGISTRY: OnceLock<RwLock<HashMap<String, TransportFactory>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, TransportFactory>> {
    TRANSPORT_REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers a transport factory function.
///
/// This is typically called from transport modules' `register()` functions
/// during library initialization.
///
/// # Example
///
/// ```no_run
/// use azurerm_state::factory::register_transport;
/// use azurerm_state::transport::Transport;
/// use azurerm_state::Result;
/// use std::sync::Arc;
///
/// fn my_transport_factory() -> Result<Arc<dyn Transport>> {
///     // Create and return transport instance
///     # unimplemented!()
/// }
///
/// pub fn register() {
///     register_transport("mytransport", my_transport_factory);
/// }
/// ```
pub fn register_transport(name: &str, factory: TransportFactory) {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    reg.insert(name.to_string(), factory);
}

/// Creates a registered transport by name.
///
/// # Errors
///
/// Returns [`AzurermError::UnknownTransport`] if nothing is registered under
/// `name` (missing feature flag or `register()` call).
pub fn new_transport(name: &str) -> Result<Arc<dyn Transport>> {
    let factory = {
        let reg = registry().read().unwrap_or_else(|e| e.into_inner());
        *reg
            .get(name)
            .ok_or_else(|| AzurermError::UnknownTransport(name.to_string()))?
    };

    factory()
}

/// Management client families.
///
/// Each maps to one Azure management SDK surface; the tag is what profile
/// files and logs use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    /// `compute`
    Compute,
    /// `network`
    Network,
    /// `storage`
    Storage,
    /// `dns`
    Dns,
    /// `keyvault`
    KeyVault,
    /// `postgresql`
    PostgreSql,
    /// `monitor`
    Monitor,
    /// `authorization`
    Authorization,
    /// `resource`
    Resource,
    /// `policy`
    Policy,
    /// `subscription`
    Subscription,
    /// `managementlock`
    ManagementLock,
    /// `web`
    Web,
    /// `redis`
    Redis,
    /// `loganalytics`
    LogAnalytics,
}

impl ClientType {
    /// Every client type.
    pub const ALL: [ClientType; 15] = [
        Self::Compute,
        Self::Network,
        Self::Storage,
        Self::Dns,
        Self::KeyVault,
        Self::PostgreSql,
        Self::Monitor,
        Self::Authorization,
        Self::Resource,
        Self::Policy,
        Self::Subscription,
        Self::ManagementLock,
        Self::Web,
        Self::Redis,
        Self::LogAnalytics,
    ];

    /// Returns the lowercase tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Dns => "dns",
            Self::KeyVault => "keyvault",
            Self::PostgreSql => "postgresql",
            Self::Monitor => "monitor",
            Self::Authorization => "authorization",
            Self::Resource => "resource",
            Self::Policy => "policy",
            Self::Subscription => "subscription",
            Self::ManagementLock => "managementlock",
            Self::Web => "web",
            Self::Redis => "redis",
            Self::LogAnalytics => "loganalytics",
        }
    }

    /// Tag with the first letter capitalized, as used in cloud error logs.
    pub fn label(&self) -> String {
        let tag = self.as_str();
        let mut chars = tag.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Returns true if clients of this type are scoped to a subscription.
    pub fn is_subscription_bound(&self) -> bool {
        !matches!(self, Self::Subscription)
    }
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ClientType {
    type Err = AzurermError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| AzurermError::UnknownClientType(s.to_string()))
    }
}

/// Default interval between long-running operation polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Creates authenticated management clients over a shared transport.
///
/// # Example
///
/// ```no_run
/// use azurerm_state::factory::{ClientFactory, ClientType};
/// use azurerm_state::Profile;
///
/// #[tokio::main]
/// async fn main() -> azurerm_state::Result<()> {
///     let factory = ClientFactory::from_registry("http")?;
///     let profile = Profile::new("00000000-0000-0000-0000-000000000000")
///         .with_service_principal("app-id", "secret", "tenant-id");
///
///     let client = factory.client(&profile, ClientType::Compute).await?;
///     println!("bound to {:?}", client.subscription_id());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ClientFactory {
    transport: Arc<dyn Transport>,
    user_agent: String,
    poll_interval: Duration,
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory")
            .field("transport", &self.transport.name())
            .field("user_agent", &self.user_agent)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl ClientFactory {
    /// Creates a factory over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            user_agent: format!("azurerm-state/{}", env!("CARGO_PKG_VERSION")),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Creates a factory over a registered transport.
    pub fn from_registry(name: &str) -> Result<Self> {
        crate::init();
        Ok(Self::new(new_transport(name)?))
    }

    /// Sets the fallback interval between long-running operation polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the `User-Agent` sent with every request.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Returns the transport shared by this factory's clients.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Creates a management client for `profile`.
    ///
    /// Credentials are resolved eagerly; the token itself is fetched on the
    /// first request.
    ///
    /// # Errors
    ///
    /// Returns [`AzurermError::Authentication`] if the profile does not
    /// describe a usable credential.
    pub async fn client(&self, profile: &Profile, client_type: ClientType) -> Result<ManagementClient> {
        let (credential, subscription_id) = credential::resolve(profile)?;
        let endpoints =
            resolve_endpoints(self.transport.as_ref(), profile.cloud_environment.as_deref()).await;

        tracing::debug!(
            client = %client_type,
            credential = credential.kind(),
            cloud = %endpoints.name,
            "creating management client"
        );

        let subscription_id = client_type
            .is_subscription_bound()
            .then_some(subscription_id);

        Ok(ManagementClient::new(
            Arc::clone(&self.transport),
            credential,
            endpoints,
            client_type,
            subscription_id,
        )
        .with_user_agent(self.user_agent.clone())
        .with_poll_interval(self.poll_interval))
    }
}
