//! # Database Sessions
//!
//! A session is one connection bound to one principal, opened for the
//! duration of a provisioning phase and closed afterwards. The provisioner
//! only sees the [`DatabaseSession`] trait so it can be driven against an
//! in-memory double.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, Executor, PgConnection};
use tokio::sync::Mutex;

use super::sql;
use crate::config::ConnectionSettings;
use crate::errors::{BootstrapError, Result};
use crate::secrets::SecretString;

/// The application role to ensure, with the password it logs in with
#[derive(Debug, Clone)]
pub struct AppPrincipal {
    pub role: String,
    pub password: SecretString,
}

impl AppPrincipal {
    pub fn from_connection(settings: &ConnectionSettings) -> Self {
        Self { role: settings.user.clone(), password: settings.password.clone() }
    }
}

/// Catalog lookups and DDL needed by the database pipeline
#[async_trait]
pub trait DatabaseSession: Send + Sync {
    async fn role_exists(&self, role: &str) -> Result<bool>;

    /// Create the role and grant its baseline privileges atomically
    async fn create_role(&self, principal: &AppPrincipal) -> Result<()>;

    async fn database_exists(&self, database: &str) -> Result<bool>;

    async fn create_database(&self, database: &str, owner: &str) -> Result<()>;

    async fn schema_exists(&self, schema: &str) -> Result<bool>;

    async fn create_schema(&self, schema: &str, owner: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Opens sessions for a set of connection parameters
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        target: &ConnectionSettings,
        timeout: Duration,
    ) -> Result<Box<dyn DatabaseSession>>;
}

/// PostgreSQL session over a single `PgConnection`
pub struct PgSession {
    target: String,
    connection: Mutex<Option<PgConnection>>,
}

impl PgSession {
    pub async fn connect(settings: &ConnectionSettings, timeout: Duration) -> Result<Self> {
        let target = settings.display_target();
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database)
            .username(&settings.user)
            .password(settings.password.expose_secret());

        let connection = tokio::time::timeout(timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                tracing::error!(target_db = %target, timeout_ms = timeout.as_millis(), "Database connection timed out");
                BootstrapError::transport(format!("Timed out connecting to {}", target))
            })?
            .map_err(|e| {
                tracing::error!(error = %e, target_db = %target, "Failed to connect to database");
                BootstrapError::database(e, format!("Failed to connect to database: {}", target))
            })?;

        tracing::debug!(target_db = %target, "Database session opened");
        Ok(Self { target, connection: Mutex::new(Some(connection)) })
    }

    fn closed(&self) -> BootstrapError {
        BootstrapError::internal(format!("Session to {} is already closed", self.target))
    }

    async fn lookup(&self, query: &str, name: &str) -> Result<bool> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.closed())?;

        let row: Option<i32> = sqlx::query_scalar(query)
            .bind(name)
            .fetch_optional(connection)
            .await
            .map_err(|e| BootstrapError::database(e, format!("Catalog lookup for '{}' failed", name)))?;

        Ok(row.is_some())
    }

    async fn execute(&self, statement: &str, context: String) -> Result<()> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.closed())?;

        connection
            .execute(statement)
            .await
            .map_err(|e| BootstrapError::database(e, context))?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseSession for PgSession {
    async fn role_exists(&self, role: &str) -> Result<bool> {
        self.lookup(sql::ROLE_EXISTS, role).await
    }

    async fn create_role(&self, principal: &AppPrincipal) -> Result<()> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(|| self.closed())?;
        let context = || format!("Failed to create role '{}'", principal.role);

        let mut tx = connection.begin().await.map_err(|e| BootstrapError::database(e, context()))?;
        for statement in sql::create_role_statements(&principal.role, &principal.password) {
            (&mut *tx)
                .execute(statement.as_str())
                .await
                .map_err(|e| BootstrapError::database(e, context()))?;
        }
        tx.commit().await.map_err(|e| BootstrapError::database(e, context()))?;
        Ok(())
    }

    async fn database_exists(&self, database: &str) -> Result<bool> {
        self.lookup(sql::DATABASE_EXISTS, database).await
    }

    async fn create_database(&self, database: &str, owner: &str) -> Result<()> {
        // CREATE DATABASE cannot run inside a transaction block.
        self.execute(
            &sql::create_database_statement(database, owner),
            format!("Failed to create database '{}'", database),
        )
        .await
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        self.lookup(sql::SCHEMA_EXISTS, schema).await
    }

    async fn create_schema(&self, schema: &str, owner: &str) -> Result<()> {
        self.execute(
            &sql::create_schema_statement(schema, owner),
            format!("Failed to create schema '{}'", schema),
        )
        .await
    }

    async fn close(&self) -> Result<()> {
        if let Some(connection) = self.connection.lock().await.take() {
            connection
                .close()
                .await
                .map_err(|e| BootstrapError::database(e, format!("Failed to close session to {}", self.target)))?;
            tracing::debug!(target_db = %self.target, "Database session closed");
        }
        Ok(())
    }
}

/// Opens [`PgSession`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct PgSessionFactory;

#[async_trait]
impl SessionFactory for PgSessionFactory {
    async fn open(
        &self,
        target: &ConnectionSettings,
        timeout: Duration,
    ) -> Result<Box<dyn DatabaseSession>> {
        Ok(Box::new(PgSession::connect(target, timeout).await?))
    }
}
