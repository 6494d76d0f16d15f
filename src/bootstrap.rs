//! # Bootstrap Orchestration
//!
//! Runs the selected pipelines one after another in the fixed order
//! database, identity, secrets. A fatal fault stops the run; reports from
//! pipelines that already ran are kept for the summary.

use crate::config::{BootstrapConfig, Stage};
use crate::database::{DatabaseProvisioner, PgSessionFactory, SessionFactory};
use crate::errors::{BootstrapError, Result};
use crate::identity::{IdentityProvisioner, KeycloakAdminClient};
use crate::reconcile::ReconcileReport;
use crate::secrets::{AdminConnector, SecretsProvisioner, VaultLifecycleClient, VaultrsConnector};

/// Everything a run produced
#[derive(Debug, Default)]
pub struct BootstrapSummary {
    pub reports: Vec<ReconcileReport>,
    /// The fault that stopped the run, with the stage it occurred in
    pub fatal: Option<(Stage, BootstrapError)>,
}

impl BootstrapSummary {
    pub fn failed_resources(&self) -> usize {
        self.reports.iter().map(|r| r.failures().count()).sum()
    }

    pub fn is_success(&self) -> bool {
        self.fatal.is_none() && self.failed_resources() == 0
    }

    pub fn report(&self, stage: Stage) -> Option<&ReconcileReport> {
        self.reports.iter().find(|r| r.pipeline() == stage.as_str())
    }

    /// Convert into a `Result`, surfacing the fatal fault if there was one
    pub fn into_result(self) -> Result<Vec<ReconcileReport>> {
        match self.fatal {
            Some((_, error)) => Err(error),
            None => Ok(self.reports),
        }
    }
}

/// Runs pipelines against the configured systems.
///
/// Database sessions and Vault admin clients come from the given factories;
/// the identity provider and the Vault lifecycle endpoints are reached over
/// HTTP at the configured URLs.
pub struct Bootstrapper<'a, F: SessionFactory, C: AdminConnector + Clone> {
    config: &'a BootstrapConfig,
    sessions: F,
    vault_admin: Option<C>,
}

impl<'a> Bootstrapper<'a, PgSessionFactory, VaultrsConnector> {
    pub fn new(config: &'a BootstrapConfig) -> Self {
        let vault_admin = config.secrets.as_ref().map(|s| VaultrsConnector::new(s.url.clone()));
        Self { config, sessions: PgSessionFactory, vault_admin }
    }
}

impl<'a, F: SessionFactory + Clone, C: AdminConnector + Clone> Bootstrapper<'a, F, C> {
    pub fn with_collaborators(config: &'a BootstrapConfig, sessions: F, vault_admin: C) -> Self {
        Self { config, sessions, vault_admin: Some(vault_admin) }
    }

    pub async fn run(&self, stages: &[Stage]) -> BootstrapSummary {
        let mut summary = BootstrapSummary::default();

        for stage in Stage::ALL.iter().copied().filter(|s| stages.contains(s)) {
            tracing::info!(stage = %stage, "Starting pipeline");
            let mut report = ReconcileReport::new(stage.as_str());
            let result = self.run_stage(stage, &mut report).await;
            summary.reports.push(report);

            if let Err(error) = result {
                tracing::error!(stage = %stage, category = %error.category(), error = %error, "Pipeline aborted");
                summary.fatal = Some((stage, error));
                break;
            }
            tracing::info!(stage = %stage, "Pipeline finished");
        }

        summary
    }

    async fn run_stage(&self, stage: Stage, report: &mut ReconcileReport) -> Result<()> {
        let timeout = self.config.http.timeout();
        match stage {
            Stage::Database => {
                let settings = self.config.database()?;
                DatabaseProvisioner::new(settings, self.sessions.clone()).run(report).await
            }
            Stage::Identity => {
                let settings = self.config.identity()?;
                let client = KeycloakAdminClient::login(
                    &settings.url,
                    &settings.bootstrap_admin_username,
                    &settings.bootstrap_admin_password,
                    timeout,
                )
                .await?;
                IdentityProvisioner::new(settings, client).run(report).await
            }
            Stage::Secrets => {
                let settings = self.config.secrets()?;
                let connector = self
                    .vault_admin
                    .clone()
                    .ok_or_else(|| BootstrapError::config("secrets settings not loaded"))?;
                let lifecycle = VaultLifecycleClient::new(&settings.url, timeout)?;
                SecretsProvisioner::new(settings, lifecycle, connector).run(report).await
            }
        }
    }
}
