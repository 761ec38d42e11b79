//! AWS Secrets Manager secret store.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::Client;
use aws_sdk_secretsmanager::error::DisplayErrorContext;

use super::{CredentialError, SecretStore};

/// Secret store backed by AWS Secrets Manager.
///
/// AWS credentials and region come from the default provider chain
/// (environment, profile, instance role).
#[derive(Debug, Clone)]
pub struct AwsSecretsManager {
    client: Client,
}

impl AwsSecretsManager {
    /// Loads the default AWS configuration and builds a client.
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self {
            client: Client::new(&config),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretsManager {
    async fn get_secret_string(&self, secret_id: &str) -> Result<String, CredentialError> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| CredentialError::SecretStore {
                secret_id: secret_id.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        if let Some(text) = response.secret_string() {
            return Ok(text.to_string());
        }
        if let Some(blob) = response.secret_binary() {
            return String::from_utf8(blob.as_ref().to_vec()).map_err(|e| {
                CredentialError::InvalidSecret {
                    secret_id: secret_id.to_string(),
                    message: e.to_string(),
                }
            });
        }
        Err(CredentialError::InvalidSecret {
            secret_id: secret_id.to_string(),
            message: "secret has neither string nor binary payload".to_string(),
        })
    }
}
