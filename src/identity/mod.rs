//! # Identity Provisioning
//!
//! Realm, client, admin group, role bindings and admin user bootstrap
//! against the identity provider's admin REST API.

pub mod client;
pub mod dto;
pub mod provisioner;

pub use client::KeycloakAdminClient;
pub use provisioner::IdentityProvisioner;
