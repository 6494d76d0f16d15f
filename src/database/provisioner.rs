//! # Database Provisioner
//!
//! Ensures the application role, the application database owned by it, and
//! the required schemas. The role and database are handled through an
//! administrative session; schemas through a session authenticated as the
//! application role itself. Any failure aborts the pipeline.

use tracing::Instrument;

use super::session::{AppPrincipal, DatabaseSession, SessionFactory};
use crate::config::DatabaseSettings;
use crate::errors::{BootstrapError, Result};
use crate::reconcile::{
    reconcile, ReconcileReport, ReconciliationOutcome, ResourceDescriptor, ResourceKind,
};

pub struct DatabaseProvisioner<'a, F: SessionFactory> {
    settings: &'a DatabaseSettings,
    factory: F,
}

impl<'a, F: SessionFactory> DatabaseProvisioner<'a, F> {
    pub fn new(settings: &'a DatabaseSettings, factory: F) -> Self {
        Self { settings, factory }
    }

    /// Run the pipeline, appending one record per resource to `report`
    pub async fn run(&self, report: &mut ReconcileReport) -> Result<()> {
        let span = crate::pipeline_span!("database", admin = %self.settings.admin.display_target());
        async move {
            let principal = AppPrincipal::from_connection(&self.settings.app);
            let timeout = self.settings.connect_timeout();

            let admin = self.factory.open(&self.settings.admin, timeout).await?;
            let result = self.ensure_owner_objects(admin.as_ref(), &principal, report).await;
            close_session(admin.as_ref()).await;
            result?;

            let app = self.factory.open(&self.settings.app, timeout).await?;
            let result = self.ensure_schemas(app.as_ref(), &principal, report).await;
            close_session(app.as_ref()).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn ensure_owner_objects(
        &self,
        session: &dyn DatabaseSession,
        principal: &AppPrincipal,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let role = ResourceDescriptor::new(ResourceKind::Role, &principal.role);
        let outcome = reconcile(
            &role,
            || session.role_exists(&principal.role),
            || session.create_role(principal),
        )
        .await?;
        record_or_abort(report, role, outcome)?;

        let database_name = &self.settings.app.database;
        let database = ResourceDescriptor::new(ResourceKind::Database, database_name)
            .with_attribute("owner", &principal.role);
        let outcome = reconcile(
            &database,
            || session.database_exists(database_name),
            || session.create_database(database_name, &principal.role),
        )
        .await?;
        record_or_abort(report, database, outcome)
    }

    async fn ensure_schemas(
        &self,
        session: &dyn DatabaseSession,
        principal: &AppPrincipal,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        for schema_name in &self.settings.schemas {
            let schema = ResourceDescriptor::new(ResourceKind::Schema, schema_name)
                .in_scope(&self.settings.app.database)
                .with_attribute("owner", &principal.role);
            let outcome = reconcile(
                &schema,
                || session.schema_exists(schema_name),
                || session.create_schema(schema_name, &principal.role),
            )
            .await?;
            record_or_abort(report, schema, outcome)?;
        }
        Ok(())
    }
}

/// Record the outcome; a failed creation stops the pipeline
fn record_or_abort(
    report: &mut ReconcileReport,
    descriptor: ResourceDescriptor,
    outcome: ReconciliationOutcome,
) -> Result<()> {
    let failure = match &outcome {
        ReconciliationOutcome::Failed(reason) => Some(BootstrapError::creation(
            descriptor.kind().as_str(),
            descriptor.key(),
            reason.clone(),
        )),
        _ => None,
    };
    report.record(descriptor, outcome);
    failure.map_or(Ok(()), Err)
}

async fn close_session(session: &dyn DatabaseSession) {
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Failed to close database session cleanly");
    }
}
