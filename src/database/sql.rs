//! Statement text for role, database and schema provisioning.
//!
//! DDL cannot take bind parameters, so names are quoted as identifiers and
//! the password as a literal before being spliced into the statement.

use crate::secrets::SecretString;

/// Quote an SQL identifier, doubling embedded double quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal.
///
/// Embedded single quotes are doubled. Values containing a backslash use
/// the escape-string form so the result is correct regardless of
/// `standard_conforming_strings`.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

pub const ROLE_EXISTS: &str = "SELECT 1 FROM pg_roles WHERE rolname = $1";
pub const DATABASE_EXISTS: &str = "SELECT 1 FROM pg_database WHERE datname = $1";
pub const SCHEMA_EXISTS: &str = "SELECT 1 FROM pg_namespace WHERE nspname = $1";

/// Statements that create the application role and grant its baseline
/// privileges. Executed together in one transaction.
pub fn create_role_statements(role: &str, password: &SecretString) -> Vec<String> {
    let role = quote_ident(role);
    vec![
        format!(
            "CREATE ROLE {} NOSUPERUSER NOCREATEDB NOCREATEROLE NOINHERIT LOGIN NOREPLICATION NOBYPASSRLS PASSWORD {}",
            role,
            quote_literal(password.expose_secret())
        ),
        format!("GRANT ALL ON SCHEMA public TO {}", role),
        format!("ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT ALL ON TABLES TO {}", role),
        format!(
            "ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT INSERT, UPDATE, DELETE, REFERENCES, TRIGGER, TRUNCATE ON TABLES TO {}",
            role
        ),
        format!("ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT ALL ON FUNCTIONS TO {}", role),
        format!("ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT ALL ON SEQUENCES TO {}", role),
    ]
}

pub fn create_database_statement(database: &str, owner: &str) -> String {
    format!("CREATE DATABASE {} OWNER {}", quote_ident(database), quote_ident(owner))
}

pub fn create_schema_statement(schema: &str, owner: &str) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS {} AUTHORIZATION {}",
        quote_ident(schema),
        quote_ident(owner)
    )
}
