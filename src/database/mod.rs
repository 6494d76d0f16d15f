//! # Database Provisioning
//!
//! Application role, database and schema bootstrap for PostgreSQL.

pub mod provisioner;
pub mod session;
pub mod sql;

pub use provisioner::DatabaseProvisioner;
pub use session::{AppPrincipal, DatabaseSession, PgSession, PgSessionFactory, SessionFactory};
