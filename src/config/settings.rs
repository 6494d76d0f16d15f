//! # Configuration Settings
//!
//! Immutable settings for each pipeline, read once from an environment-style
//! source. Reading never stops at the first problem: every missing or
//! unparsable key is collected and reported in a single error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use serde::Serialize;
use validator::Validate;

use crate::errors::{BootstrapError, Result};
use crate::secrets::SecretString;

/// Pipelines that can be selected for a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Database,
    Identity,
    Secrets,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Database, Stage::Identity, Stage::Secrets];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Database => "database",
            Stage::Identity => "identity",
            Stage::Secrets => "secrets",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value lookup the settings are read from
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment (after `.env` loading)
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl ConfigSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Collects missing and malformed keys while settings are read
struct EnvReader<'a, S: ConfigSource + ?Sized> {
    source: &'a S,
    missing: Vec<String>,
    invalid: Vec<String>,
}

impl<'a, S: ConfigSource + ?Sized> EnvReader<'a, S> {
    fn new(source: &'a S) -> Self {
        Self { source, missing: Vec::new(), invalid: Vec::new() }
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.source.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&mut self, key: &str) -> String {
        match self.optional(key) {
            Some(value) => value,
            None => {
                self.missing.push(key.to_string());
                String::new()
            }
        }
    }

    fn required_secret(&mut self, key: &str) -> SecretString {
        // Passwords are taken verbatim, surrounding whitespace included.
        match self.source.get(key).filter(|v| !v.is_empty()) {
            Some(value) => SecretString::new(value),
            None => {
                self.missing.push(key.to_string());
                SecretString::default()
            }
        }
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_required<T: FromStr + Default>(&mut self, key: &str) -> T {
        match self.optional(key) {
            Some(raw) => self.parse_value(key, &raw),
            None => {
                self.missing.push(key.to_string());
                T::default()
            }
        }
    }

    fn parse_or<T: FromStr + Default>(&mut self, key: &str, default: T) -> T {
        match self.optional(key) {
            Some(raw) => self.parse_value(key, &raw),
            None => default,
        }
    }

    fn parse_value<T: FromStr + Default>(&mut self, key: &str, raw: &str) -> T {
        raw.parse().unwrap_or_else(|_| {
            self.invalid.push(format!("{}={}", key, raw));
            T::default()
        })
    }

    fn secret_list(&self, key: &str) -> Vec<SecretString> {
        self.source
            .get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(SecretString::new)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn finish(self) -> Result<()> {
        if !self.missing.is_empty() {
            let mut error = BootstrapError::missing_config(self.missing);
            if !self.invalid.is_empty() {
                if let BootstrapError::Config { message, .. } = &mut error {
                    message.push_str(&format!("; invalid values: {}", self.invalid.join(", ")));
                }
            }
            return Err(error);
        }
        if !self.invalid.is_empty() {
            return Err(BootstrapError::config(format!(
                "invalid configuration values: {}",
                self.invalid.join(", ")
            )));
        }
        Ok(())
    }
}

/// Connection parameters for one database principal
#[derive(Debug, Clone, Serialize, Validate)]
pub struct ConnectionSettings {
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    #[validate(length(min = 1, message = "Database name cannot be empty"))]
    pub database: String,

    #[validate(length(min = 1, message = "User cannot be empty"))]
    pub user: String,

    pub password: SecretString,
}

impl ConnectionSettings {
    /// Credential-free description for logs
    pub fn display_target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// Settings for the database pipeline
#[derive(Debug, Clone, Serialize, Validate)]
pub struct DatabaseSettings {
    /// Administrative principal used to create the role and database
    #[validate(nested)]
    pub admin: ConnectionSettings,

    /// Application principal; `app.user` is the role to ensure and
    /// `app.database` the database it owns
    #[validate(nested)]
    pub app: ConnectionSettings,

    /// Schemas to ensure inside the application database, in order
    #[validate(length(min = 1, message = "At least one schema is required"))]
    pub schemas: Vec<String>,

    #[validate(range(min = 1, max = 300, message = "Connect timeout must be between 1 and 300 seconds"))]
    pub connect_timeout_seconds: u64,
}

impl DatabaseSettings {
    fn read<S: ConfigSource + ?Sized>(env: &mut EnvReader<'_, S>) -> Self {
        let admin = ConnectionSettings {
            host: env.required("POSTGRES_HOST"),
            port: env.parse_required("POSTGRES_PORT"),
            database: env.required("POSTGRES_DB"),
            user: env.required("POSTGRES_USER"),
            password: env.required_secret("POSTGRES_PASSWORD"),
        };
        let app = ConnectionSettings {
            host: env.required("TODO_APP_HOST"),
            port: env.parse_required("TODO_APP_PORT"),
            database: env.required("TODO_APP_DB"),
            user: env.required("TODO_APP_DB_USER"),
            password: env.required_secret("TODO_APP_DB_PASSWORD"),
        };
        let schemas = vec![env.required("KC_DB_SCHEMA"), env.required("TODO_APP_SCHEMA")];
        let connect_timeout_seconds = env.parse_or("DATABASE_CONNECT_TIMEOUT_SECONDS", 10);

        Self { admin, app, schemas, connect_timeout_seconds }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Which realm users are placed in the admin group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MembershipPolicy {
    /// Bootstrap: promote all realm users into the admin group
    #[default]
    PromoteAllRealmUsers,
    /// Only the configured admin user joins the admin group
    AdminUserOnly,
}

impl FromStr for MembershipPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all-realm-users" | "all" => Ok(Self::PromoteAllRealmUsers),
            "admin-only" => Ok(Self::AdminUserOnly),
            other => Err(format!("unknown membership policy '{}'", other)),
        }
    }
}

/// Settings for the identity-provider pipeline
#[derive(Debug, Clone, Serialize, Validate)]
pub struct IdentitySettings {
    #[validate(url(message = "Identity provider URL must be a valid URL"))]
    pub url: String,

    #[validate(length(min = 1))]
    pub bootstrap_admin_username: String,

    pub bootstrap_admin_password: SecretString,

    #[validate(length(min = 1))]
    pub realm: String,

    #[validate(length(min = 1))]
    pub client_id: String,

    #[validate(length(min = 1))]
    pub client_redirect_uri: String,

    #[validate(length(min = 1))]
    pub admin_group: String,

    #[validate(length(min = 1))]
    pub admin_username: String,

    pub admin_password: SecretString,

    #[validate(email(message = "Admin email must be a valid e-mail address"))]
    pub admin_email: String,

    pub membership_policy: MembershipPolicy,
}

impl IdentitySettings {
    fn read<S: ConfigSource + ?Sized>(env: &mut EnvReader<'_, S>) -> Self {
        Self {
            url: env.required("KEYCLOAK_URL").trim_end_matches('/').to_string(),
            bootstrap_admin_username: env.required("KC_BOOTSTRAP_ADMIN_USERNAME"),
            bootstrap_admin_password: env.required_secret("KC_BOOTSTRAP_ADMIN_PASSWORD"),
            realm: env.required("KEYCLOAK_APP_REALM_NAME"),
            client_id: env.required("KEYCLOAK_APP_CLIENT_NAME"),
            client_redirect_uri: env
                .or_default("KEYCLOAK_APP_CLIENT_REDIRECT_URI", "http://localhost:8080/*"),
            admin_group: env.required("KEYCLOAK_APP_ADMIN_GROUP_NAME"),
            admin_username: env.required("KEYCLOAK_APP_ADMIN_USERNAME"),
            admin_password: env.required_secret("KEYCLOAK_APP_ADMIN_PASSWORD"),
            admin_email: env.required("KEYCLOAK_APP_ADMIN_EMAIL"),
            membership_policy: env.parse_or("KEYCLOAK_APP_GROUP_MEMBERSHIP", MembershipPolicy::default()),
        }
    }
}

/// Root token and unseal shares supplied from outside for an already
/// initialized secrets store
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuppliedVaultMaterial {
    pub token: Option<SecretString>,
    pub keys: Vec<SecretString>,
    pub keys_base64: Vec<SecretString>,
}

/// Settings for the secrets-store pipeline
#[derive(Debug, Clone, Serialize, Validate)]
pub struct SecretsSettings {
    #[validate(url(message = "Vault URL must be a valid URL"))]
    pub url: String,

    #[validate(range(min = 1, max = 255, message = "Shares must be between 1 and 255"))]
    pub shares: u8,

    #[validate(range(min = 1, max = 255, message = "Threshold must be between 1 and 255"))]
    pub threshold: u8,

    #[validate(length(min = 1))]
    pub engine_path: String,

    #[validate(length(min = 1))]
    pub engine_type: String,

    #[validate(length(min = 1))]
    pub policy_name: String,

    #[validate(length(min = 1))]
    pub auth_method_path: String,

    #[validate(length(min = 1))]
    pub user_name: String,

    pub user_password: SecretString,

    pub supplied: SuppliedVaultMaterial,

    /// Directory the root credentials file is written to
    pub creds_dir: PathBuf,
}

impl SecretsSettings {
    fn read<S: ConfigSource + ?Sized>(env: &mut EnvReader<'_, S>) -> Self {
        Self {
            url: env.or_default("VAULT_URL", "http://localhost:8200").trim_end_matches('/').to_string(),
            shares: env.parse_or("VAULT_SHARES", 1),
            threshold: env.parse_or("VAULT_THRESHOLD", 1),
            engine_path: env.required("VAULT_SECRET_ENGINE_NAME").trim_matches('/').to_string(),
            engine_type: env.or_default("VAULT_SECRET_ENGINE_TYPE", "kv"),
            policy_name: env.required("VAULT_POLICY_NAME"),
            auth_method_path: env.required("VAULT_AUTH_METHOD_NAME").trim_matches('/').to_string(),
            user_name: env.required("VAULT_USER_NAME"),
            user_password: env.required_secret("VAULT_USER_PASSWORD"),
            supplied: SuppliedVaultMaterial {
                token: env.optional("VAULT_TOKEN").map(SecretString::new),
                keys: env.secret_list("VAULT_KEYS"),
                keys_base64: env.secret_list("VAULT_KEYS_BASE64"),
            },
            creds_dir: PathBuf::from(env.or_default("VAULT_CREDS_DIR", ".")),
        }
    }

    fn validate_custom(&self) -> Result<()> {
        if self.threshold > self.shares {
            return Err(BootstrapError::validation_field(
                format!(
                    "Threshold ({}) cannot exceed the number of shares ({})",
                    self.threshold, self.shares
                ),
                "VAULT_THRESHOLD",
            ));
        }

        for (index, share) in self.supplied.keys_base64.iter().enumerate() {
            if base64::engine::general_purpose::STANDARD.decode(share.expose_secret()).is_err() {
                return Err(BootstrapError::validation_field(
                    format!("Unseal share #{} is not valid base64", index + 1),
                    "VAULT_KEYS_BASE64",
                ));
            }
        }

        Ok(())
    }
}

/// Settings shared by the HTTP collaborators
#[derive(Debug, Clone, Serialize, Validate)]
pub struct HttpSettings {
    #[validate(range(min = 1, max = 600, message = "Timeout must be between 1 and 600 seconds"))]
    pub timeout_seconds: u64,
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported log format '{}'. Use 'text' or 'json'", other)),
        }
    }
}

/// Subscriber settings, resolved from CLI flags and `BOOTSTRAP_LOG_FORMAT`
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Immutable configuration for one bootstrap run.
///
/// Only sections for the selected stages are populated.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapConfig {
    pub database: Option<DatabaseSettings>,
    pub identity: Option<IdentitySettings>,
    pub secrets: Option<SecretsSettings>,
    pub http: HttpSettings,
}

impl BootstrapConfig {
    /// Read configuration for `stages` from the process environment
    pub fn from_env(stages: &[Stage]) -> Result<Self> {
        Self::from_source(&ProcessEnv, stages)
    }

    /// Read and validate configuration for `stages` from `source`.
    ///
    /// Every missing key across all selected sections is reported in one
    /// [`BootstrapError::Config`].
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S, stages: &[Stage]) -> Result<Self> {
        let mut env = EnvReader::new(source);

        let database = stages.contains(&Stage::Database).then(|| DatabaseSettings::read(&mut env));
        let identity = stages.contains(&Stage::Identity).then(|| IdentitySettings::read(&mut env));
        let secrets = stages.contains(&Stage::Secrets).then(|| SecretsSettings::read(&mut env));
        let http = HttpSettings { timeout_seconds: env.parse_or("BOOTSTRAP_HTTP_TIMEOUT_SECONDS", 30) };

        env.finish()?;

        let config = Self { database, identity, secrets, http };
        config.validate()?;
        Ok(config)
    }

    /// Validate every populated section
    pub fn validate(&self) -> Result<()> {
        if let Some(database) = &self.database {
            Validate::validate(database)?;
        }
        if let Some(identity) = &self.identity {
            Validate::validate(identity)?;
        }
        if let Some(secrets) = &self.secrets {
            Validate::validate(secrets)?;
            secrets.validate_custom()?;
        }
        Validate::validate(&self.http)?;
        Ok(())
    }

    pub fn database(&self) -> Result<&DatabaseSettings> {
        self.database.as_ref().ok_or_else(|| BootstrapError::config("database settings not loaded"))
    }

    pub fn identity(&self) -> Result<&IdentitySettings> {
        self.identity.as_ref().ok_or_else(|| BootstrapError::config("identity settings not loaded"))
    }

    pub fn secrets(&self) -> Result<&SecretsSettings> {
        self.secrets.as_ref().ok_or_else(|| BootstrapError::config("secrets settings not loaded"))
    }
}

/// Sanitize a URL for logging (remove credentials)
pub fn sanitize_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if parsed.password().is_some() || !parsed.username().is_empty() {
            let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
            format!(
                "{}://***:***@{}{}{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or("unknown"),
                port,
                parsed.path()
            )
        } else {
            url.to_string()
        }
    } else {
        url.to_string()
    }
}
