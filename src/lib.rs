//! # stack-bootstrap
//!
//! Idempotent bootstrap of the backbone of an application stack: a
//! PostgreSQL role, database and schemas; a Keycloak realm, client, admin
//! group and admin user; and an initialized, unsealed Vault with a secrets
//! engine, policy, userpass auth method and service user.
//!
//! ## Architecture
//!
//! ```text
//! cli → bootstrap ─┬─ database::DatabaseProvisioner ─┐
//!                  ├─ identity::IdentityProvisioner ─┼─ reconcile::reconcile
//!                  └─ secrets::SecretsProvisioner ───┘
//! ```
//!
//! Every provisioner is a fixed sequence of [`reconcile::reconcile`] calls:
//! look up the resource by its natural key, create it only if absent,
//! never update it. Pipelines run strictly one after another.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use stack_bootstrap::{BootstrapConfig, Bootstrapper, Stage};
//!
//! # async fn example() -> stack_bootstrap::Result<()> {
//! let config = BootstrapConfig::from_env(&Stage::ALL)?;
//! let summary = Bootstrapper::new(&config).run(&Stage::ALL).await;
//! summary.into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod database;
pub mod errors;
pub mod identity;
pub mod observability;
pub mod reconcile;
pub mod secrets;

// Re-export commonly used types and traits
pub use bootstrap::{BootstrapSummary, Bootstrapper};
pub use config::{BootstrapConfig, Stage};
pub use errors::{BootstrapError, Result};
pub use reconcile::{reconcile, ReconcileReport, ReconciliationOutcome, ResourceDescriptor, ResourceKind};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
