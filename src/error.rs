//! Error types for Azure Resource Manager operations.
//!
//! Errors come in two layers. [`AzurermError`] covers failures that indicate
//! misconfiguration (credentials, unknown client types, unreadable profile
//! files) and is propagated with `?` all the way out of state functions.
//! [`ExecError`] is what a single exec operation returns; its cloud and
//! object-model variants are ordinary outcomes that the reconciler folds into
//! a failed [`StateReturn`](crate::state::StateReturn).

use crate::model::ModelError;
use serde_json::Value;
use thiserror::Error;

/// Result type alias using [`AzurermError`].
pub type Result<T> = std::result::Result<T, AzurermError>;

/// Result type returned by exec operations.
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Fatal errors: configuration and credential problems.
#[derive(Debug, Error)]
pub enum AzurermError {
    /// Credentials could not be determined or a token could not be obtained.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// A client type tag did not name a known management client.
    #[error("the Azure ARM client_type {0} specified can not be found")]
    UnknownClientType(String),

    /// No transport is registered under the requested name.
    #[error("unknown transport: {0} (did you enable the '{0}' feature flag?)")]
    UnknownTransport(String),

    /// A profile or account file is malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Credential resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// One of `client_id`, `secret` or `tenant` is present but empty.
    #[error(
        "the client_id, secret, and tenant parameters must all be populated if using service principals"
    )]
    IncompleteServicePrincipal,

    /// One of `username` or `password` is present but empty.
    #[error(
        "the username and password parameters must both be populated if using username/password authentication"
    )]
    IncompleteUserPassword,

    /// No recognizable combination of credential fields was supplied.
    #[error(
        "unable to determine credentials: a subscription_id with username and password, \
         or client_id, secret, and tenant, or a profile with the required parameters populated is required"
    )]
    Undetermined,

    /// `subscription_id` is missing.
    #[error("a subscription_id must be specified")]
    MissingSubscription,

    /// Fell through to managed identity and the token endpoint refused us.
    #[error("fell through to managed identity authentication and was unable to authenticate ({0})")]
    ManagedIdentity(String),

    /// The token endpoint rejected a service principal or password grant.
    #[error("token request to {endpoint} failed: {message}")]
    TokenRequest {
        /// Token endpoint URL
        endpoint: String,
        /// Error reported by the endpoint
        message: String,
    },
}

/// An error reported by Azure Resource Manager, or by the request pipeline
/// before the request left the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("({code}) {message}")]
pub struct CloudError {
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// ARM error code (e.g. `ResourceNotFound`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl CloudError {
    /// Creates a cloud error.
    pub fn new(status: Option<u16>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Builds an error from a non-success ARM response.
    ///
    /// ARM wraps errors as `{"error": {"code": ..., "message": ...}}`; some
    /// older endpoints return the inner object directly.
    pub fn from_response(status: u16, body: Option<&Value>) -> Self {
        let detail = body.map(|b| b.get("error").unwrap_or(b));
        let code = detail
            .and_then(|d| d.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HttpError{}", status));
        let message = match detail {
            Some(d) => d
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| d.to_string()),
            None => format!("request failed with status {}", status),
        };
        Self::new(Some(status), code, message)
    }

    /// A request that failed client-side validation.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(None, "ValidationError", message)
    }

    /// Returns true if the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Outcome of a failed exec operation.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Azure returned an error (not found, validation, authorization, ...).
    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// The request payload could not be assembled from the parameters.
    #[error("The object model could not be built. ({0})")]
    ModelBuild(String),

    /// A payload or response could not be (de)serialized.
    #[error("The object model could not be parsed. ({0})")]
    ModelParse(String),

    /// Misconfiguration; never folded into a state result.
    #[error(transparent)]
    Fatal(#[from] AzurermError),
}

impl ExecError {
    /// Returns true if this is a cloud "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Cloud(e) if e.is_not_found())
    }

    /// Returns true if this error must be propagated rather than reported.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<AuthError> for ExecError {
    fn from(err: AuthError) -> Self {
        Self::Fatal(AzurermError::Authentication(err))
    }
}

impl From<ModelError> for ExecError {
    fn from(err: ModelError) -> Self {
        if err.is_serialization() {
            Self::ModelParse(err.to_string())
        } else {
            Self::ModelBuild(err.to_string())
        }
    }
}
