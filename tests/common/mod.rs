//! Shared fixtures for integration tests
//!
//! - Settings builders for each pipeline
//! - A stateful Keycloak admin API on wiremock
//! - A stateful Vault lifecycle API on wiremock
//! - Recording doubles for database sessions and the Vault admin API

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use stack_bootstrap::config::{
    BootstrapConfig, ConnectionSettings, DatabaseSettings, HttpSettings, IdentitySettings,
    MembershipPolicy, SecretsSettings, SuppliedVaultMaterial,
};
use stack_bootstrap::database::{AppPrincipal, DatabaseSession, SessionFactory};
use stack_bootstrap::secrets::{AdminConnector, SecretString, VaultAdmin};
use stack_bootstrap::{BootstrapError, Result};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub fn connection(user: &str, database: &str) -> ConnectionSettings {
    ConnectionSettings {
        host: "localhost".to_string(),
        port: 5432,
        database: database.to_string(),
        user: user.to_string(),
        password: SecretString::new(format!("{}-pw", user)),
    }
}

pub fn database_settings() -> DatabaseSettings {
    DatabaseSettings {
        admin: connection("postgres", "postgres"),
        app: connection("todo_app", "todo"),
        schemas: vec!["keycloak".to_string(), "todo".to_string()],
        connect_timeout_seconds: 5,
    }
}

pub fn identity_settings(url: &str) -> IdentitySettings {
    IdentitySettings {
        url: url.to_string(),
        bootstrap_admin_username: "admin".to_string(),
        bootstrap_admin_password: SecretString::new("admin"),
        realm: "todo".to_string(),
        client_id: "todo-ui".to_string(),
        client_redirect_uri: "http://localhost:8080/*".to_string(),
        admin_group: "todo-admins".to_string(),
        admin_username: "todo-admin".to_string(),
        admin_password: SecretString::new("todo-admin-pw"),
        admin_email: "admin@example.com".to_string(),
        membership_policy: MembershipPolicy::PromoteAllRealmUsers,
    }
}

pub fn secrets_settings(url: &str, creds_dir: &Path) -> SecretsSettings {
    SecretsSettings {
        url: url.to_string(),
        shares: 1,
        threshold: 1,
        engine_path: "todo".to_string(),
        engine_type: "kv".to_string(),
        policy_name: "todo-policy".to_string(),
        auth_method_path: "userpass".to_string(),
        user_name: "todo-svc".to_string(),
        user_password: SecretString::new("svc-pw"),
        supplied: SuppliedVaultMaterial::default(),
        creds_dir: creds_dir.to_path_buf(),
    }
}

pub fn full_config(keycloak_url: &str, vault_url: &str, creds_dir: &Path) -> BootstrapConfig {
    BootstrapConfig {
        database: Some(database_settings()),
        identity: Some(identity_settings(keycloak_url)),
        secrets: Some(secrets_settings(vault_url, creds_dir)),
        http: HttpSettings { timeout_seconds: 5 },
    }
}

pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/realms/master/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Stateful Keycloak
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct KeycloakState {
    pub realms: BTreeSet<String>,
    pub clients: BTreeSet<String>,
    /// group name -> id
    pub groups: BTreeMap<String, String>,
    pub available_realm_roles: Vec<Value>,
    pub available_client_roles: Vec<Value>,
    /// username -> id
    pub users: BTreeMap<String, String>,
    pub members: BTreeSet<String>,
    /// "METHOD path" of every mutating call, in order
    pub writes: Vec<String>,
    /// "GET path" of every listing call, in order
    pub reads: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeKeycloak {
    pub state: Arc<Mutex<KeycloakState>>,
}

impl FakeKeycloak {
    pub fn with_roles(realm_roles: usize, client_roles: usize) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            state.available_realm_roles = (0..realm_roles)
                .map(|i| json!({"id": format!("rr-{}", i), "name": format!("realm-role-{}", i), "description": null}))
                .collect();
            state.available_client_roles = (0..client_roles)
                .map(|i| json!({
                    "id": format!("cr-{}", i),
                    "role": format!("client-role-{}", i),
                    "description": "",
                    "clientId": "rm-client",
                    "client": "realm-management"
                }))
                .collect();
        }
        fake
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock().unwrap();
        state.writes.clear();
        state.reads.clear();
    }

    fn responder<F>(&self, handler: F) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync
    where
        F: Fn(&mut KeycloakState, &Request) -> ResponseTemplate + Send + Sync,
    {
        let state = self.state.clone();
        move |request: &Request| {
            let mut state = state.lock().unwrap();
            let entry = format!("{} {}", request.method, request.url.path());
            if request.method.as_str() == "GET" {
                state.reads.push(entry);
            } else {
                state.writes.push(entry);
            }
            handler(&mut state, request)
        }
    }

    async fn mount<F>(&self, server: &MockServer, verb: &str, pattern: &str, handler: F)
    where
        F: Fn(&mut KeycloakState, &Request) -> ResponseTemplate + Send + Sync + 'static,
    {
        Mock::given(method(verb))
            .and(path_regex(pattern))
            .respond_with(self.responder(handler))
            .mount(server)
            .await;
    }

    pub async fn start(&self) -> MockServer {
        let server = MockServer::start().await;
        mount_token(&server).await;

        self.mount(&server, "GET", r"^/admin/realms$", |s, _| {
            let body: Vec<Value> = s.realms.iter().map(|r| json!({"realm": r, "enabled": true})).collect();
            ResponseTemplate::new(200).set_body_json(body)
        })
        .await;
        self.mount(&server, "POST", r"^/admin/realms$", |s, r| {
            let body: Value = r.body_json().unwrap_or_default();
            s.realms.insert(body["realm"].as_str().unwrap_or_default().to_string());
            ResponseTemplate::new(201)
        })
        .await;

        self.mount(&server, "GET", r"^/admin/realms/[^/]+/clients$", |s, _| {
            let body: Vec<Value> = s.clients.iter().map(|c| json!({"id": format!("id-{}", c), "clientId": c})).collect();
            ResponseTemplate::new(200).set_body_json(body)
        })
        .await;
        self.mount(&server, "POST", r"^/admin/realms/[^/]+/clients$", |s, r| {
            let body: Value = r.body_json().unwrap_or_default();
            s.clients.insert(body["clientId"].as_str().unwrap_or_default().to_string());
            ResponseTemplate::new(201)
        })
        .await;

        self.mount(&server, "GET", r"^/admin/realms/[^/]+/groups$", |s, _| {
            let body: Vec<Value> = s.groups.iter().map(|(name, id)| json!({"id": id, "name": name})).collect();
            ResponseTemplate::new(200).set_body_json(body)
        })
        .await;
        self.mount(&server, "POST", r"^/admin/realms/[^/]+/groups$", |s, r| {
            let body: Value = r.body_json().unwrap_or_default();
            let id = format!("g-{}", s.groups.len() + 1);
            s.groups.insert(body["name"].as_str().unwrap_or_default().to_string(), id);
            ResponseTemplate::new(201)
        })
        .await;

        self.mount(&server, "GET", r"^/admin/realms/[^/]+/groups/[^/]+/role-mappings/realm/available$", |s, _| {
            ResponseTemplate::new(200).set_body_json(s.available_realm_roles.clone())
        })
        .await;
        self.mount(&server, "POST", r"^/admin/realms/[^/]+/groups/[^/]+/role-mappings/realm$", |s, r| {
            let assigned: Vec<Value> = r.body_json().unwrap_or_default();
            s.available_realm_roles.retain(|role| !assigned.iter().any(|a| a["id"] == role["id"]));
            ResponseTemplate::new(204)
        })
        .await;
        self.mount(&server, "GET", r"^/admin/realms/[^/]+/ui-ext/available-roles/groups/[^/]+$", |s, _| {
            ResponseTemplate::new(200).set_body_json(s.available_client_roles.clone())
        })
        .await;
        self.mount(&server, "POST", r"^/admin/realms/[^/]+/groups/[^/]+/role-mappings/clients/[^/]+$", |s, r| {
            let assigned: Vec<Value> = r.body_json().unwrap_or_default();
            s.available_client_roles.retain(|role| !assigned.iter().any(|a| a["id"] == role["id"]));
            ResponseTemplate::new(204)
        })
        .await;

        self.mount(&server, "GET", r"^/admin/realms/[^/]+/users$", |s, _| {
            let body: Vec<Value> = s.users.iter().map(|(name, id)| json!({"id": id, "username": name})).collect();
            ResponseTemplate::new(200).set_body_json(body)
        })
        .await;
        self.mount(&server, "POST", r"^/admin/realms/[^/]+/users$", |s, r| {
            let body: Value = r.body_json().unwrap_or_default();
            let id = format!("u-{}", s.users.len() + 1);
            s.users.insert(body["username"].as_str().unwrap_or_default().to_string(), id);
            ResponseTemplate::new(201)
        })
        .await;
        self.mount(&server, "GET", r"^/admin/realms/[^/]+/groups/[^/]+/members$", |s, _| {
            let body: Vec<Value> = s
                .users
                .iter()
                .filter(|(_, id)| s.members.contains(*id))
                .map(|(name, id)| json!({"id": id, "username": name}))
                .collect();
            ResponseTemplate::new(200).set_body_json(body)
        })
        .await;
        self.mount(&server, "PUT", r"^/admin/realms/[^/]+/users/[^/]+/groups/[^/]+$", |s, r| {
            let segments: Vec<&str> = r.url.path().split('/').collect();
            // /admin/realms/{realm}/users/{id}/groups/{group}
            if let Some(user_id) = segments.get(5) {
                s.members.insert(user_id.to_string());
            }
            ResponseTemplate::new(204)
        })
        .await;

        server
    }
}

// ---------------------------------------------------------------------------
// Stateful Vault lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct VaultLifecycleState {
    pub initialized: bool,
    pub sealed: bool,
    pub threshold: u8,
    pub progress: u8,
    pub init_calls: usize,
    pub unseal_calls: usize,
}

#[derive(Clone, Default)]
pub struct FakeVaultLifecycle {
    pub state: Arc<Mutex<VaultLifecycleState>>,
}

impl FakeVaultLifecycle {
    pub fn new(initialized: bool, sealed: bool, threshold: u8) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            state.initialized = initialized;
            state.sealed = sealed;
            state.threshold = threshold;
        }
        fake
    }

    fn status(state: &VaultLifecycleState) -> Value {
        json!({
            "type": "shamir",
            "initialized": state.initialized,
            "sealed": state.sealed,
            "t": state.threshold,
            "n": state.threshold,
            "progress": state.progress
        })
    }

    pub async fn start(&self) -> MockServer {
        let server = MockServer::start().await;

        let state = self.state.clone();
        Mock::given(method("GET"))
            .and(path("/v1/sys/init"))
            .respond_with(move |_: &Request| {
                let initialized = state.lock().unwrap().initialized;
                ResponseTemplate::new(200).set_body_json(json!({"initialized": initialized}))
            })
            .mount(&server)
            .await;

        let state = self.state.clone();
        Mock::given(method("GET"))
            .and(path("/v1/sys/seal-status"))
            .respond_with(move |_: &Request| {
                ResponseTemplate::new(200).set_body_json(Self::status(&state.lock().unwrap()))
            })
            .mount(&server)
            .await;

        let state = self.state.clone();
        Mock::given(method("PUT"))
            .and(path("/v1/sys/init"))
            .respond_with(move |request: &Request| {
                let mut state = state.lock().unwrap();
                let body: Value = request.body_json().unwrap_or_default();
                let shares = body["secret_shares"].as_u64().unwrap_or(1);
                state.init_calls += 1;
                state.initialized = true;
                state.sealed = true;
                state.threshold = body["secret_threshold"].as_u64().unwrap_or(1) as u8;
                let keys: Vec<String> = (0..shares).map(|i| format!("hex-{}", i)).collect();
                let keys_base64: Vec<String> = (0..shares).map(|i| format!("b64-{}", i)).collect();
                ResponseTemplate::new(200).set_body_json(json!({
                    "keys": keys,
                    "keys_base64": keys_base64,
                    "root_token": "hvs.generated"
                }))
            })
            .mount(&server)
            .await;

        let state = self.state.clone();
        Mock::given(method("PUT"))
            .and(path("/v1/sys/unseal"))
            .respond_with(move |_: &Request| {
                let mut state = state.lock().unwrap();
                state.unseal_calls += 1;
                state.progress += 1;
                if state.progress >= state.threshold {
                    state.sealed = false;
                    state.progress = 0;
                }
                ResponseTemplate::new(200).set_body_json(Self::status(&state))
            })
            .mount(&server)
            .await;

        server
    }
}

// ---------------------------------------------------------------------------
// Database double
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Catalog {
    pub roles: BTreeSet<String>,
    pub databases: BTreeMap<String, String>,
    pub schemas: BTreeMap<String, String>,
    pub calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeSessions {
    pub catalog: Arc<Mutex<Catalog>>,
}

impl FakeSessions {
    pub fn calls(&self) -> Vec<String> {
        self.catalog.lock().unwrap().calls.clone()
    }
}

struct FakeSession {
    principal: String,
    catalog: Arc<Mutex<Catalog>>,
}

impl FakeSession {
    fn log(&self, call: String) {
        self.catalog.lock().unwrap().calls.push(format!("{}:{}", self.principal, call));
    }
}

#[async_trait]
impl DatabaseSession for FakeSession {
    async fn role_exists(&self, role: &str) -> Result<bool> {
        self.log(format!("role_exists {}", role));
        Ok(self.catalog.lock().unwrap().roles.contains(role))
    }

    async fn create_role(&self, principal: &AppPrincipal) -> Result<()> {
        self.log(format!("create_role {}", principal.role));
        self.catalog.lock().unwrap().roles.insert(principal.role.clone());
        Ok(())
    }

    async fn database_exists(&self, database: &str) -> Result<bool> {
        self.log(format!("database_exists {}", database));
        Ok(self.catalog.lock().unwrap().databases.contains_key(database))
    }

    async fn create_database(&self, database: &str, owner: &str) -> Result<()> {
        self.log(format!("create_database {}", database));
        let mut catalog = self.catalog.lock().unwrap();
        if !catalog.roles.contains(owner) {
            return Err(BootstrapError::creation("database", database, format!("role \"{}\" does not exist", owner)));
        }
        catalog.databases.insert(database.to_string(), owner.to_string());
        Ok(())
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        self.log(format!("schema_exists {}", schema));
        Ok(self.catalog.lock().unwrap().schemas.contains_key(schema))
    }

    async fn create_schema(&self, schema: &str, owner: &str) -> Result<()> {
        self.log(format!("create_schema {}", schema));
        self.catalog.lock().unwrap().schemas.insert(schema.to_string(), owner.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log("close".to_string());
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open(&self, target: &ConnectionSettings, _timeout: Duration) -> Result<Box<dyn DatabaseSession>> {
        let mut catalog = self.catalog.lock().unwrap();
        catalog.calls.push(format!("open {}@{}", target.user, target.database));
        if target.user != "postgres" && !catalog.roles.contains(&target.user) {
            return Err(BootstrapError::transport(format!("role \"{}\" does not exist", target.user)));
        }
        Ok(Box::new(FakeSession { principal: target.user.clone(), catalog: self.catalog.clone() }))
    }
}

// ---------------------------------------------------------------------------
// Vault admin double
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct VaultAdminState {
    pub engines: BTreeSet<String>,
    pub policies: BTreeMap<String, String>,
    pub auth_methods: BTreeSet<String>,
    pub users: BTreeMap<String, Vec<String>>,
    pub tokens: Vec<String>,
    pub calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeVaultAdmin {
    pub state: Arc<Mutex<VaultAdminState>>,
}

impl FakeVaultAdmin {
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn log(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }
}

#[async_trait]
impl VaultAdmin for FakeVaultAdmin {
    async fn list_secrets_engines(&self) -> Result<Vec<String>> {
        self.log("list_engines");
        Ok(self.state.lock().unwrap().engines.iter().map(|e| format!("{}/", e)).collect())
    }

    async fn enable_secrets_engine(&self, path: &str, _engine_type: &str, _description: &str) -> Result<()> {
        self.log(format!("enable_engine {}", path));
        self.state.lock().unwrap().engines.insert(path.to_string());
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<String>> {
        self.log("list_policies");
        Ok(self.state.lock().unwrap().policies.keys().cloned().collect())
    }

    async fn write_policy(&self, name: &str, policy: &str) -> Result<()> {
        self.log(format!("write_policy {}", name));
        self.state.lock().unwrap().policies.insert(name.to_string(), policy.to_string());
        Ok(())
    }

    async fn list_auth_methods(&self) -> Result<Vec<String>> {
        self.log("list_auth");
        Ok(self.state.lock().unwrap().auth_methods.iter().map(|m| format!("{}/", m)).collect())
    }

    async fn enable_auth_method(&self, path: &str, _method_type: &str) -> Result<()> {
        self.log(format!("enable_auth {}", path));
        self.state.lock().unwrap().auth_methods.insert(path.to_string());
        Ok(())
    }

    async fn list_users(&self, _mount: &str) -> Result<Vec<String>> {
        self.log("list_users");
        let state = self.state.lock().unwrap();
        if state.users.is_empty() {
            return Err(BootstrapError::listing("users", 404));
        }
        Ok(state.users.keys().cloned().collect())
    }

    async fn create_user(
        &self,
        _mount: &str,
        username: &str,
        _password: &SecretString,
        policies: &[String],
    ) -> Result<()> {
        self.log(format!("create_user {}", username));
        self.state.lock().unwrap().users.insert(username.to_string(), policies.to_vec());
        Ok(())
    }
}

impl AdminConnector for FakeVaultAdmin {
    fn connect(&self, token: &SecretString) -> Result<Box<dyn VaultAdmin>> {
        self.state.lock().unwrap().tokens.push(token.expose_secret().to_string());
        Ok(Box::new(self.clone()))
    }
}
