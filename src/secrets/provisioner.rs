//! # Secrets Provisioner
//!
//! Drives the store from whatever lifecycle state it is in to unsealed, then
//! ensures the secrets engine, access policy, userpass auth method and the
//! service user. Lifecycle faults are fatal; each configuration item is
//! attempted regardless of how the previous one went.

use chrono::Local;
use tracing::Instrument;

use super::admin::{AdminConnector, VaultAdmin};
use super::credentials::{self, RootCredentialBundle};
use super::lifecycle::{SealLifecycle, SealState};
use super::types::SecretString;
use crate::config::{sanitize_url, SecretsSettings};
use crate::errors::{BootstrapError, Result};
use crate::reconcile::{reconcile, ReconcileReport, ResourceDescriptor, ResourceKind};

const USERPASS: &str = "userpass";

/// Policy granting full CRUD and list on everything under the engine mount
pub fn engine_policy(engine_path: &str) -> String {
    format!(
        "path \"{}/*\" {{\n  capabilities = [\"create\", \"read\", \"update\", \"delete\", \"list\"]\n}}\n",
        engine_path
    )
}

/// Mount listings key every path with exactly one trailing slash
fn mount_key(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}

/// Root token and unseal shares available to this run
#[derive(Debug)]
struct UnsealMaterial {
    token: SecretString,
    shares: Vec<SecretString>,
}

impl From<&RootCredentialBundle> for UnsealMaterial {
    fn from(bundle: &RootCredentialBundle) -> Self {
        Self { token: bundle.root_token.clone(), shares: bundle.keys_base64.clone() }
    }
}

pub struct SecretsProvisioner<'a, L: SealLifecycle, C: AdminConnector> {
    settings: &'a SecretsSettings,
    lifecycle: L,
    connector: C,
}

impl<'a, L: SealLifecycle, C: AdminConnector> SecretsProvisioner<'a, L, C> {
    pub fn new(settings: &'a SecretsSettings, lifecycle: L, connector: C) -> Self {
        Self { settings, lifecycle, connector }
    }

    pub async fn run(&self, report: &mut ReconcileReport) -> Result<()> {
        let span = crate::pipeline_span!("secrets", url = %sanitize_url(&self.settings.url));
        async move {
            let token = self.ensure_unsealed().await?;
            let admin = self.connector.connect(&token)?;
            self.configure(admin.as_ref(), report).await
        }
        .instrument(span)
        .await
    }

    /// Bring the store to [`SealState::Unsealed`] and return the root token
    pub async fn ensure_unsealed(&self) -> Result<SecretString> {
        let material = if self.lifecycle.is_initialized().await? {
            tracing::info!("Vault already initialized, using supplied root token and unseal keys");
            self.supplied_material()?
        } else {
            tracing::info!(state = %SealState::Uninitialized, "Vault not initialized, initializing");
            self.initialize().await?
        };

        let status = self.lifecycle.seal_status().await?;
        let state = SealState::from_status(true, status.sealed);
        tracing::info!(state = %state, threshold = status.t, shares = status.n, "Observed seal state");

        if state == SealState::InitializedSealed {
            self.unseal(&material.shares, usize::from(status.t)).await?;
        }

        Ok(material.token)
    }

    async fn initialize(&self) -> Result<UnsealMaterial> {
        let path = credentials::credentials_path(&self.settings.creds_dir, Local::now().date_naive());
        credentials::ensure_writable(&path)?;

        let bundle = self.lifecycle.initialize(self.settings.shares, self.settings.threshold).await?;
        tracing::info!(
            shares = self.settings.shares,
            threshold = self.settings.threshold,
            state = %SealState::InitializedSealed,
            "Vault initialized"
        );

        if let Err(e) = credentials::persist(&bundle, &path) {
            tracing::error!(
                error = %e,
                path = %path.display(),
                "Root credentials could not be persisted and cannot be regenerated"
            );
            return Err(e);
        }

        let returned = bundle.keys_base64.len();
        if returned != usize::from(self.settings.shares) {
            tracing::error!(
                returned,
                requested = self.settings.shares,
                path = %path.display(),
                "Vault returned an unexpected number of unseal shares; root credentials were saved"
            );
            return Err(BootstrapError::seal_state(format!(
                "Initialization returned {} shares, expected {} (root credentials saved to {})",
                returned,
                self.settings.shares,
                path.display()
            )));
        }

        Ok(UnsealMaterial::from(&bundle))
    }

    fn supplied_material(&self) -> Result<UnsealMaterial> {
        let supplied = &self.settings.supplied;
        let token = supplied.token.clone().ok_or_else(|| {
            BootstrapError::seal_state("Vault is initialized but VAULT_TOKEN was not supplied")
        })?;
        let shares = if supplied.keys_base64.is_empty() {
            supplied.keys.clone()
        } else {
            supplied.keys_base64.clone()
        };
        Ok(UnsealMaterial { token, shares })
    }

    /// Submit exactly `threshold` distinct shares, then confirm the store
    /// reports unsealed
    async fn unseal(&self, shares: &[SecretString], threshold: usize) -> Result<()> {
        if shares.len() < threshold {
            return Err(BootstrapError::seal_state(format!(
                "Vault is sealed with threshold {} but only {} unseal share(s) are available",
                threshold,
                shares.len()
            )));
        }

        for (index, share) in shares.iter().take(threshold).enumerate() {
            let status = self.lifecycle.submit_unseal_share(share).await?;
            tracing::debug!(share = index + 1, progress = status.progress, sealed = status.sealed, "Submitted unseal share");
        }

        let status = self.lifecycle.seal_status().await?;
        if status.sealed {
            return Err(BootstrapError::seal_state(format!(
                "Vault is still sealed after submitting {} share(s) (progress {}/{})",
                threshold, status.progress, status.t
            )));
        }

        tracing::info!(state = %SealState::Unsealed, "Vault unsealed");
        Ok(())
    }

    /// Ensure engine, policy, auth method and user on an unsealed store
    pub async fn configure(&self, admin: &dyn VaultAdmin, report: &mut ReconcileReport) -> Result<()> {
        let settings = self.settings;

        let engine = &settings.engine_path;
        let description = format!("{} secrets engine", engine);
        let engine_key = mount_key(engine);
        let descriptor = ResourceDescriptor::new(ResourceKind::SecretsEngine, engine)
            .with_attribute("type", &settings.engine_type);
        let outcome = reconcile(
            &descriptor,
            || async {
                let mounts = admin.list_secrets_engines().await?;
                Ok(mounts.iter().any(|m| m == &engine_key))
            },
            || admin.enable_secrets_engine(engine, &settings.engine_type, &description),
        )
        .await?;
        report.record(descriptor, outcome);

        let policy = &settings.policy_name;
        let policy_text = engine_policy(engine);
        let descriptor = ResourceDescriptor::new(ResourceKind::Policy, policy);
        let outcome = reconcile(
            &descriptor,
            || async {
                let policies = admin.list_policies().await?;
                Ok(policies.iter().any(|p| p.eq_ignore_ascii_case(policy)))
            },
            || admin.write_policy(policy, &policy_text),
        )
        .await?;
        report.record(descriptor, outcome);

        let mount = &settings.auth_method_path;
        let mount_path = mount_key(mount);
        let descriptor = ResourceDescriptor::new(ResourceKind::AuthMethod, mount).with_attribute("type", USERPASS);
        let outcome = reconcile(
            &descriptor,
            || async {
                let methods = admin.list_auth_methods().await?;
                Ok(methods.iter().any(|m| m == &mount_path))
            },
            || admin.enable_auth_method(mount, USERPASS),
        )
        .await?;
        report.record(descriptor, outcome);

        let user = &settings.user_name;
        let policies = vec![policy.clone()];
        let descriptor = ResourceDescriptor::new(ResourceKind::SecretsUser, user)
            .in_scope(mount)
            .with_attribute("policy", policy);
        let outcome = reconcile(
            &descriptor,
            || async {
                // An empty userpass backend answers the list call with 404.
                match admin.list_users(mount).await {
                    Ok(users) => Ok(users.iter().any(|u| u.eq_ignore_ascii_case(user))),
                    Err(e) => {
                        tracing::warn!(error = %e, mount = %mount, "Could not list users, assuming absent");
                        Ok(false)
                    }
                }
            },
            || admin.create_user(mount, user, &settings.user_password, &policies),
        )
        .await?;
        report.record(descriptor, outcome);

        Ok(())
    }
}
