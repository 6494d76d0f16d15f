//! # Configuration Management
//!
//! Settings for the bootstrap run are read from the environment (a `.env`
//! file is loaded first by the binary). Only the sections for the selected
//! stages are required.

pub mod settings;

pub use settings::{
    sanitize_url, BootstrapConfig, ConfigSource, ConnectionSettings, DatabaseSettings,
    HttpSettings, IdentitySettings, LogFormat, LoggingConfig, MembershipPolicy, ProcessEnv,
    SecretsSettings, Stage, SuppliedVaultMaterial,
};
