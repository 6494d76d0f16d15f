//! Token-authenticated Vault administration: secrets engines, policies,
//! auth methods and userpass users.

use async_trait::async_trait;
use vaultrs::api::auth::userpass::requests::CreateUserRequestBuilder;
use vaultrs::api::sys::requests::EnableEngineRequestBuilder;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;

use super::types::SecretString;
use crate::errors::{BootstrapError, Result};

/// Admin operations used by the secrets pipeline.
///
/// Mount listings return paths with their trailing slash (`kv/`), as Vault
/// reports them.
#[async_trait]
pub trait VaultAdmin: Send + Sync {
    async fn list_secrets_engines(&self) -> Result<Vec<String>>;

    async fn enable_secrets_engine(&self, path: &str, engine_type: &str, description: &str) -> Result<()>;

    async fn list_policies(&self) -> Result<Vec<String>>;

    async fn write_policy(&self, name: &str, policy: &str) -> Result<()>;

    async fn list_auth_methods(&self) -> Result<Vec<String>>;

    async fn enable_auth_method(&self, path: &str, method_type: &str) -> Result<()>;

    async fn list_users(&self, mount: &str) -> Result<Vec<String>>;

    async fn create_user(
        &self,
        mount: &str,
        username: &str,
        password: &SecretString,
        policies: &[String],
    ) -> Result<()>;
}

/// Builds an admin client once the root token is known
pub trait AdminConnector: Send + Sync {
    fn connect(&self, token: &SecretString) -> Result<Box<dyn VaultAdmin>>;
}

/// [`VaultAdmin`] backed by `vaultrs`
pub struct VaultrsAdmin {
    client: VaultClient,
}

impl VaultrsAdmin {
    pub fn new(address: &str, token: &SecretString) -> Result<Self> {
        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(address);
        settings_builder.token(token.expose_secret());

        let settings = settings_builder.build().map_err(|e| {
            tracing::error!(error = %e, address = %address, "Failed to build Vault client settings");
            BootstrapError::vault(format!("Invalid Vault client settings: {}", e))
        })?;
        let client = VaultClient::new(settings).map_err(|e| {
            tracing::error!(error = %e, address = %address, "Failed to create Vault client");
            BootstrapError::from(e)
        })?;

        Ok(Self { client })
    }
}

/// API errors on a listing become listing faults carrying the status code
fn listing_error(resource: &str, error: ClientError) -> BootstrapError {
    match error {
        ClientError::APIError { code, .. } => BootstrapError::listing(resource, code),
        other => BootstrapError::from(other),
    }
}

fn creation_error(kind: &str, name: &str, error: ClientError) -> BootstrapError {
    BootstrapError::creation(kind, name, error.to_string())
}

#[async_trait]
impl VaultAdmin for VaultrsAdmin {
    async fn list_secrets_engines(&self) -> Result<Vec<String>> {
        let mounts = vaultrs::sys::mount::list(&self.client)
            .await
            .map_err(|e| listing_error("secrets engines", e))?;
        Ok(mounts.into_keys().collect())
    }

    async fn enable_secrets_engine(&self, path: &str, engine_type: &str, description: &str) -> Result<()> {
        let mut options = EnableEngineRequestBuilder::default();
        options.description(description);
        vaultrs::sys::mount::enable(&self.client, path, engine_type, Some(&mut options))
            .await
            .map_err(|e| creation_error("secrets engine", path, e))
    }

    async fn list_policies(&self) -> Result<Vec<String>> {
        let response = vaultrs::sys::policy::list(&self.client)
            .await
            .map_err(|e| listing_error("policies", e))?;
        Ok(response.policies)
    }

    async fn write_policy(&self, name: &str, policy: &str) -> Result<()> {
        vaultrs::sys::policy::set(&self.client, name, policy)
            .await
            .map_err(|e| creation_error("policy", name, e))
    }

    async fn list_auth_methods(&self) -> Result<Vec<String>> {
        let methods = vaultrs::sys::auth::list(&self.client)
            .await
            .map_err(|e| listing_error("auth methods", e))?;
        Ok(methods.into_keys().collect())
    }

    async fn enable_auth_method(&self, path: &str, method_type: &str) -> Result<()> {
        vaultrs::sys::auth::enable(&self.client, path, method_type, None)
            .await
            .map_err(|e| creation_error("auth method", path, e))
    }

    async fn list_users(&self, mount: &str) -> Result<Vec<String>> {
        let response = vaultrs::auth::userpass::user::list(&self.client, mount)
            .await
            .map_err(|e| listing_error("users", e))?;
        Ok(response.keys)
    }

    async fn create_user(
        &self,
        mount: &str,
        username: &str,
        password: &SecretString,
        policies: &[String],
    ) -> Result<()> {
        let mut options = CreateUserRequestBuilder::default();
        options.token_policies(policies.to_vec());
        vaultrs::auth::userpass::user::set(
            &self.client,
            mount,
            username,
            password.expose_secret(),
            Some(&mut options),
        )
        .await
        .map_err(|e| creation_error("user", username, e))
    }
}

/// Connects [`VaultrsAdmin`] clients to one Vault address
#[derive(Debug, Clone)]
pub struct VaultrsConnector {
    address: String,
}

impl VaultrsConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into() }
    }
}

impl AdminConnector for VaultrsConnector {
    fn connect(&self, token: &SecretString) -> Result<Box<dyn VaultAdmin>> {
        Ok(Box::new(VaultrsAdmin::new(&self.address, token)?))
    }
}
