//! Credential resolution and token acquisition.

use crate::cloud::Endpoints;
use crate::session::Session;
use crate::transport::{Method, Request, Response, Transport};
use crate::{AuthError, AzurermError, Profile, Result};
use serde_json::Value;

/// Public client id of the Azure CLI, used for password grants.
const PUBLIC_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

/// Instance Metadata Service token endpoint.
const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Lifetime assumed when a token response omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// A resolved credential.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Service principal (client credentials grant)
    ServicePrincipal {
        /// Application id
        client_id: String,
        /// Client secret
        secret: String,
        /// Directory id
        tenant: String,
    },
    /// Username and password (resource owner password grant)
    UserPassword {
        /// User principal name
        username: String,
        /// Password
        password: String,
    },
    /// Managed identity of the host
    ManagedIdentity,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServicePrincipal {
                client_id, tenant, ..
            } => f
                .debug_struct("ServicePrincipal")
                .field("client_id", client_id)
                .field("tenant", tenant)
                .finish_non_exhaustive(),
            Self::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::ManagedIdentity => write!(f, "ManagedIdentity"),
        }
    }
}

fn populated(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Determines the credential and subscription id for a profile.
///
/// Combinations are tried in order: service principal (`client_id`,
/// `secret`, `tenant`), then username/password, then managed identity when
/// only `subscription_id` is present.
///
/// # Errors
///
/// - [`AuthError::IncompleteServicePrincipal`] /
///   [`AuthError::IncompleteUserPassword`]: the combination is present but a
///   field is empty
/// - [`AuthError::Undetermined`]: no combination matches
/// - [`AuthError::MissingSubscription`]: `subscription_id` is absent
pub fn resolve(profile: &Profile) -> std::result::Result<(Credential, String), AuthError> {
    let credential = if profile.client_id.is_some()
        && profile.secret.is_some()
        && profile.tenant.is_some()
    {
        if !(populated(&profile.client_id) && populated(&profile.secret) && populated(&profile.tenant))
        {
            return Err(AuthError::IncompleteServicePrincipal);
        }
        Credential::ServicePrincipal {
            client_id: profile.client_id.clone().unwrap_or_default(),
            secret: profile.secret.clone().unwrap_or_default(),
            tenant: profile.tenant.clone().unwrap_or_default(),
        }
    } else if profile.username.is_some() && profile.password.is_some() {
        if !(populated(&profile.username) && populated(&profile.password)) {
            return Err(AuthError::IncompleteUserPassword);
        }
        Credential::UserPassword {
            username: profile.username.clone().unwrap_or_default(),
            password: profile.password.clone().unwrap_or_default(),
        }
    } else if profile.subscription_id.is_some() {
        Credential::ManagedIdentity
    } else {
        return Err(AuthError::Undetermined);
    };

    let subscription_id = profile
        .subscription_id
        .clone()
        .ok_or(AuthError::MissingSubscription)?;

    Ok((credential, subscription_id))
}

impl Credential {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServicePrincipal { .. } => "service_principal",
            Self::UserPassword { .. } => "user_password",
            Self::ManagedIdentity => "managed_identity",
        }
    }

    /// Obtains a management-plane token for this credential.
    ///
    /// # Errors
    ///
    /// Returns [`AzurermError::Authentication`] if the token endpoint refuses
    /// the grant or cannot be reached.
    pub async fn acquire(&self, transport: &dyn Transport, endpoints: &Endpoints) -> Result<Session> {
        tracing::debug!(credential = self.kind(), cloud = %endpoints.name, "acquiring token");

        match self {
            Self::ServicePrincipal {
                client_id,
                secret,
                tenant,
            } => {
                let endpoint = format!("{}/oauth2/v2.0/token", endpoints.authority(tenant));
                let form = vec![
                    ("grant_type".to_string(), "client_credentials".to_string()),
                    ("client_id".to_string(), client_id.clone()),
                    ("client_secret".to_string(), secret.clone()),
                    ("scope".to_string(), endpoints.management_scope()),
                ];
                request_token(transport, endpoint, form).await
            }
            Self::UserPassword { username, password } => {
                let endpoint =
                    format!("{}/oauth2/v2.0/token", endpoints.authority("organizations"));
                let form = vec![
                    ("grant_type".to_string(), "password".to_string()),
                    ("client_id".to_string(), PUBLIC_CLIENT_ID.to_string()),
                    ("username".to_string(), username.clone()),
                    ("password".to_string(), password.clone()),
                    ("scope".to_string(), endpoints.management_scope()),
                ];
                request_token(transport, endpoint, form).await
            }
            Self::ManagedIdentity => {
                let url = format!(
                    "{}?api-version=2018-02-01&resource={}",
                    IMDS_TOKEN_URL, endpoints.management_audience
                );
                let request = Request::new(Method::Get, url).header("Metadata", "true");
                let response = transport
                    .send(request)
                    .await
                    .map_err(|e| AuthError::ManagedIdentity(e.to_string()))?;
                session_from(&response).map_err(|m| AuthError::ManagedIdentity(m).into())
            }
        }
    }
}

async fn request_token(
    transport: &dyn Transport,
    endpoint: String,
    form: Vec<(String, String)>,
) -> Result<Session> {
    let request = Request::new(Method::Post, endpoint.clone()).form(form);
    let response = transport.send(request).await.map_err(|e| AuthError::TokenRequest {
        endpoint: endpoint.clone(),
        message: e.to_string(),
    })?;

    session_from(&response).map_err(|message| {
        AzurermError::Authentication(AuthError::TokenRequest { endpoint, message })
    })
}

/// Extracts a session from an AAD or IMDS token response.
fn session_from(response: &Response) -> std::result::Result<Session, String> {
    let body = response.body.as_ref();

    if !response.is_success() {
        let message = body
            .and_then(|b| b.get("error_description").or_else(|| b.get("error")))
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .unwrap_or_else(|| format!("status {}", response.status));
        return Err(message);
    }

    let token = body
        .and_then(|b| b.get("access_token"))
        .and_then(Value::as_str)
        .ok_or_else(|| "token response did not contain an access_token".to_string())?;

    // AAD sends a number, IMDS a string.
    let expires_in = body
        .and_then(|b| b.get("expires_in"))
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(DEFAULT_EXPIRES_IN);

    Ok(Session::new(token, expires_in))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_principal_preferred() {
        let profile = Profile::new("sub")
            .with_service_principal("c", "s", "t")
            .with_user_password("u", "p");
        let (credential, subscription) = resolve(&profile).unwrap();

        assert!(matches!(credential, Credential::ServicePrincipal { .. }));
        assert_eq!(subscription, "sub");
    }

    #[test]
    fn test_empty_service_principal_field() {
        let profile = Profile::new("sub").with_service_principal("c", "", "t");
        assert_eq!(
            resolve(&profile).unwrap_err(),
            AuthError::IncompleteServicePrincipal
        );
    }

    #[test]
    fn test_user_password() {
        let profile = Profile::new("sub").with_user_password("u", "p");
        assert!(matches!(
            resolve(&profile).unwrap().0,
            Credential::UserPassword { .. }
        ));

        let profile = Profile::new("sub").with_user_password("u", "");
        assert_eq!(
            resolve(&profile).unwrap_err(),
            AuthError::IncompleteUserPassword
        );
    }

    #[test]
    fn test_managed_identity_fallback() {
        let (credential, _) = resolve(&Profile::new("sub")).unwrap();
        assert_eq!(credential, Credential::ManagedIdentity);
    }

    #[test]
    fn test_undetermined_and_missing_subscription() {
        assert_eq!(
            resolve(&Profile::default()).unwrap_err(),
            AuthError::Undetermined
        );

        let profile = Profile::default().with_service_principal("c", "s", "t");
        assert_eq!(
            resolve(&profile).unwrap_err(),
            AuthError::MissingSubscription
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let credential = Credential::ServicePrincipal {
            client_id: "c".into(),
            secret: "hunter2".into(),
            tenant: "t".into(),
        };
        assert!(!format!("{:?}", credential).contains("hunter2"));
    }

    #[test]
    fn test_session_from_responses() {
        let aad = Response::json(200, json!({"access_token": "a", "expires_in": 3599}));
        assert_eq!(session_from(&aad).unwrap().token(), "a");

        let imds = Response::json(200, json!({"access_token": "b", "expires_in": "86399"}));
        assert!(session_from(&imds).unwrap().is_valid());

        let denied = Response::json(
            401,
            json!({"error": "invalid_client", "error_description": "AADSTS7000215: bad secret"}),
        );
        assert!(session_from(&denied).unwrap_err().contains("AADSTS7000215"));

        let empty = Response::json(200, json!({}));
        assert!(session_from(&empty).is_err());
    }
}
