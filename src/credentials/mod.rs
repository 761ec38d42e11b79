//! Warehouse credential resolution.
//!
//! Credentials come from one of two strategies, tried in fixed order:
//!
//! 1. a secret store, when a secret id is configured, holding JSON
//!    `{ "account": "...", "user": "...", "password": "..." }`;
//! 2. the `WAREHOUSE_ACCOUNT` / `WAREHOUSE_USER` / `WAREHOUSE_PASSWORD`
//!    values captured in the configuration.
//!
//! A secret-store failure is logged and falls through to the next strategy.
//! Only the last strategy's error is returned.

#[cfg(feature = "aws-secrets")]
mod aws;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, instrument};

#[cfg(feature = "aws-secrets")]
pub use aws::AwsSecretsManager;

/// Environment variable holding the warehouse account identifier.
pub const ACCOUNT_VAR: &str = "WAREHOUSE_ACCOUNT";
/// Environment variable holding the warehouse user.
pub const USER_VAR: &str = "WAREHOUSE_USER";
/// Environment variable holding the warehouse password.
pub const PASSWORD_VAR: &str = "WAREHOUSE_PASSWORD";

/// Errors from credential strategies.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// A required value is missing or blank.
    #[error("missing required credential `{name}`\n  Suggestion: set {name} or configure WAREHOUSE_SECRET_ID")]
    Missing {
        /// Variable name.
        name: &'static str,
    },

    /// The secret store could not return the secret.
    #[error("secret store lookup for {secret_id} failed: {message}")]
    SecretStore {
        /// Secret identifier.
        secret_id: String,
        /// Store error text.
        message: String,
    },

    /// The secret did not contain the expected JSON shape.
    #[error("secret {secret_id} is malformed: {message}")]
    InvalidSecret {
        /// Secret identifier.
        secret_id: String,
        /// Parser error text.
        message: String,
    },
}

/// Resolved warehouse login.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct WarehouseCredentials {
    /// Account identifier.
    pub account: String,
    /// Login user.
    pub user: String,
    password: String,
}

impl WarehouseCredentials {
    /// Creates credentials from parts.
    pub fn new(
        account: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns `user@account` for logs.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}@{}", self.user, self.account)
    }
}

impl fmt::Debug for WarehouseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseCredentials")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Credential values captured from the environment at startup.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EnvCredentials {
    /// `WAREHOUSE_ACCOUNT`.
    pub account: Option<String>,
    /// `WAREHOUSE_USER`.
    pub user: Option<String>,
    /// `WAREHOUSE_PASSWORD`.
    pub password: Option<String>,
}

impl EnvCredentials {
    /// Captures the credential variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            account: lookup(ACCOUNT_VAR),
            user: lookup(USER_VAR),
            password: lookup(PASSWORD_VAR),
        }
    }
}

impl fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Remote store returning secret text by id.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the secret string for `secret_id`.
    async fn get_secret_string(&self, secret_id: &str) -> Result<String, CredentialError>;
}

/// One way of obtaining credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Produces credentials or explains why it cannot.
    async fn credentials(&self) -> Result<WarehouseCredentials, CredentialError>;
}

/// Strategy reading a JSON secret from a [`SecretStore`].
pub struct SecretStoreSource {
    store: Arc<dyn SecretStore>,
    secret_id: String,
}

impl SecretStoreSource {
    /// Creates the strategy for `secret_id`.
    pub fn new(store: Arc<dyn SecretStore>, secret_id: impl Into<String>) -> Self {
        Self {
            store,
            secret_id: secret_id.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for SecretStoreSource {
    fn name(&self) -> &'static str {
        "secret_store"
    }

    async fn credentials(&self) -> Result<WarehouseCredentials, CredentialError> {
        let raw = self.store.get_secret_string(&self.secret_id).await?;
        serde_json::from_str(&raw).map_err(|e| CredentialError::InvalidSecret {
            secret_id: self.secret_id.clone(),
            message: e.to_string(),
        })
    }
}

/// Strategy reading the captured environment values.
#[derive(Debug, Clone)]
pub struct EnvCredentialSource {
    env: EnvCredentials,
}

impl EnvCredentialSource {
    /// Creates the strategy over captured values.
    #[must_use]
    pub fn new(env: EnvCredentials) -> Self {
        Self { env }
    }
}

fn required(value: Option<&String>, name: &'static str) -> Result<String, CredentialError> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(CredentialError::Missing { name })
}

#[async_trait]
impl CredentialSource for EnvCredentialSource {
    fn name(&self) -> &'static str {
        "env"
    }

    async fn credentials(&self) -> Result<WarehouseCredentials, CredentialError> {
        Ok(WarehouseCredentials {
            account: required(self.env.account.as_ref(), ACCOUNT_VAR)?,
            user: required(self.env.user.as_ref(), USER_VAR)?,
            password: required(self.env.password.as_ref(), PASSWORD_VAR)?,
        })
    }
}

/// Ordered list of credential strategies.
pub struct CredentialResolver {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("CredentialResolver")
            .field("sources", &names)
            .finish()
    }
}

impl CredentialResolver {
    /// Creates a resolver trying `sources` in order.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// Standard order: secret store (when both an id and a store exist),
    /// then environment values.
    #[must_use]
    pub fn standard(
        env: EnvCredentials,
        secret_id: Option<&str>,
        store: Option<Arc<dyn SecretStore>>,
    ) -> Self {
        let mut sources: Vec<Box<dyn CredentialSource>> = Vec::with_capacity(2);
        match (secret_id, store) {
            (Some(id), Some(store)) => sources.push(Box::new(SecretStoreSource::new(store, id))),
            (Some(id), None) => {
                error!(secret_id = id, "secret id configured but no secret store is available");
            }
            (None, _) => {}
        }
        sources.push(Box::new(EnvCredentialSource::new(env)));
        Self::new(sources)
    }

    /// Returns the first successful strategy's credentials.
    ///
    /// # Errors
    ///
    /// Returns the last strategy's error when none succeeds.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> Result<WarehouseCredentials, CredentialError> {
        let mut last_error = CredentialError::Missing { name: ACCOUNT_VAR };
        for source in &self.sources {
            match source.credentials().await {
                Ok(credentials) => {
                    debug!(source = source.name(), identity = %credentials.identity(), "resolved warehouse credentials");
                    return Ok(credentials);
                }
                Err(err) => {
                    error!(source = source.name(), error = %err, "credential source failed");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}
