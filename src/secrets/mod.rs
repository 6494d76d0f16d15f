//! # Secrets Store Provisioning
//!
//! Vault lifecycle (initialize, unseal), persistence of the root credential
//! bundle, and configuration of the engine, policy, auth method and service
//! user. Secret material is carried as [`SecretString`] throughout.

pub mod admin;
pub mod credentials;
pub mod lifecycle;
pub mod provisioner;
pub mod types;

pub use admin::{AdminConnector, VaultAdmin, VaultrsAdmin, VaultrsConnector};
pub use credentials::RootCredentialBundle;
pub use lifecycle::{SealLifecycle, SealState, SealStatus, VaultLifecycleClient};
pub use provisioner::SecretsProvisioner;
pub use types::SecretString;
