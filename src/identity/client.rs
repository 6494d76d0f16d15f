//! Admin REST client for the identity provider.
//!
//! Listing calls fail with [`BootstrapError::Listing`] on any non-200
//! status, since existence cannot be decided without them. Creation and
//! assignment calls fail with [`BootstrapError::Creation`] when the status
//! differs from the documented success code (201 for creation, 204 for role
//! mappings and membership).

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::config::sanitize_url;

use super::dto::{
    AvailableClientRole, ClientRepresentation, GroupRepresentation, NewUserRepresentation,
    RealmRepresentation, RoleRepresentation, TokenResponse, UserRepresentation,
};
use crate::errors::{BootstrapError, Result};
use crate::secrets::SecretString;

const ADMIN_CLI_CLIENT_ID: &str = "admin-cli";
const USER_PAGE: [(&str, &str); 2] = [("first", "0"), ("max", "1000")];
const REALM_ROLE_PAGE: [(&str, &str); 2] = [("first", "0"), ("max", "100")];

/// Bearer-authenticated client for the identity provider admin API
#[derive(Debug, Clone)]
pub struct KeycloakAdminClient {
    client: Client,
    base_url: Url,
    token: SecretString,
}

impl KeycloakAdminClient {
    /// Exchange bootstrap administrator credentials for a bearer token.
    ///
    /// A single attempt is made; an unparsable token response is fatal.
    pub async fn login(
        base_url: &str,
        username: &str,
        password: &SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BootstrapError::transport(format!("Failed to build HTTP client: {}", e)))?;
        let base_url = parse_base_url(base_url)?;

        let token_url = join(&base_url, &["realms", "master", "protocol", "openid-connect", "token"])?;
        debug!("POST {}", sanitize_url(token_url.as_str()));

        let response = client
            .post(token_url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", ADMIN_CLI_CLIENT_ID),
                ("username", username),
                ("password", password.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "Token exchange rejected");
            return Err(BootstrapError::auth(format!(
                "Token exchange failed with status {}",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| BootstrapError::auth(format!("Token response could not be parsed: {}", e)))?;

        tracing::info!(username = %username, "Obtained admin access token");
        Ok(Self { client, base_url, token: token.access_token })
    }

    /// Build a client around an already issued token
    pub fn with_token(base_url: &str, token: SecretString, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BootstrapError::transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url: parse_base_url(base_url)?, token })
    }

    fn get(&self, segments: &[&str]) -> Result<RequestBuilder> {
        let url = join(&self.base_url, segments)?;
        debug!("GET {}", sanitize_url(url.as_str()));
        Ok(self.client.get(url).bearer_auth(self.token.expose_secret()))
    }

    fn post(&self, segments: &[&str]) -> Result<RequestBuilder> {
        let url = join(&self.base_url, segments)?;
        debug!("POST {}", sanitize_url(url.as_str()));
        Ok(self.client.post(url).bearer_auth(self.token.expose_secret()))
    }

    fn put(&self, segments: &[&str]) -> Result<RequestBuilder> {
        let url = join(&self.base_url, segments)?;
        debug!("PUT {}", sanitize_url(url.as_str()));
        Ok(self.client.put(url).bearer_auth(self.token.expose_secret()))
    }

    /// Send a listing request and decode the JSON array
    async fn list<T: DeserializeOwned>(&self, request: RequestBuilder, resource: &str) -> Result<Vec<T>> {
        let response = request.send().await?;
        let status = response.status();
        debug!("Response status: {}", status);

        if status != StatusCode::OK {
            tracing::error!(resource = %resource, status = status.as_u16(), "Listing call failed");
            return Err(BootstrapError::listing(resource, status.as_u16()));
        }

        let body = response.text().await?;
        trace!("Response body:\n{}", body);
        serde_json::from_str(&body).map_err(|e| BootstrapError::Serialization {
            source: e,
            context: format!("Failed to decode {} listing", resource),
        })
    }

    pub async fn list_realms(&self) -> Result<Vec<RealmRepresentation>> {
        self.list(self.get(&["admin", "realms"])?, "realms").await
    }

    pub async fn create_realm(&self, realm: &str) -> Result<()> {
        let body = RealmRepresentation { realm: realm.to_string(), enabled: Some(true) };
        let response = self.post(&["admin", "realms"])?.json(&body).send().await?;
        expect_status(response, StatusCode::CREATED, "realm", realm).await
    }

    pub async fn list_clients(&self, realm: &str) -> Result<Vec<ClientRepresentation>> {
        self.list(self.get(&["admin", "realms", realm, "clients"])?, "clients").await
    }

    pub async fn create_client(&self, realm: &str, client: &ClientRepresentation) -> Result<()> {
        let response =
            self.post(&["admin", "realms", realm, "clients"])?.json(client).send().await?;
        expect_status(response, StatusCode::CREATED, "client", &client.client_id).await
    }

    pub async fn list_groups(&self, realm: &str) -> Result<Vec<GroupRepresentation>> {
        self.list(self.get(&["admin", "realms", realm, "groups"])?, "groups").await
    }

    pub async fn create_group(&self, realm: &str, name: &str) -> Result<()> {
        let body = GroupRepresentation { id: None, name: name.to_string() };
        let response = self.post(&["admin", "realms", realm, "groups"])?.json(&body).send().await?;
        expect_status(response, StatusCode::CREATED, "group", name).await
    }

    /// Realm roles not yet mapped to the group
    pub async fn available_realm_roles(
        &self,
        realm: &str,
        group_id: &str,
    ) -> Result<Vec<RoleRepresentation>> {
        let request = self
            .get(&["admin", "realms", realm, "groups", group_id, "role-mappings", "realm", "available"])?
            .query(&REALM_ROLE_PAGE);
        self.list(request, "realm roles").await
    }

    /// Client roles (across all clients) not yet mapped to the group
    pub async fn available_client_roles(
        &self,
        realm: &str,
        group_id: &str,
    ) -> Result<Vec<AvailableClientRole>> {
        let request = self
            .get(&["admin", "realms", realm, "ui-ext", "available-roles", "groups", group_id])?
            .query(&USER_PAGE);
        self.list(request, "client roles").await
    }

    /// Map all given realm roles to the group in one request
    pub async fn assign_realm_roles(
        &self,
        realm: &str,
        group_id: &str,
        roles: &[RoleRepresentation],
    ) -> Result<()> {
        let response = self
            .post(&["admin", "realms", realm, "groups", group_id, "role-mappings", "realm"])?
            .json(roles)
            .send()
            .await?;
        expect_status(response, StatusCode::NO_CONTENT, "realm role mapping", group_id).await
    }

    /// Map one client role to the group through its owning client's endpoint
    pub async fn assign_client_role(
        &self,
        realm: &str,
        group_id: &str,
        role: &AvailableClientRole,
    ) -> Result<()> {
        let response = self
            .post(&["admin", "realms", realm, "groups", group_id, "role-mappings", "clients", &role.client_id])?
            .json(&[role.to_role()])
            .send()
            .await?;
        expect_status(response, StatusCode::NO_CONTENT, "client role mapping", &role.role).await
    }

    pub async fn list_users(&self, realm: &str) -> Result<Vec<UserRepresentation>> {
        let request = self.get(&["admin", "realms", realm, "users"])?.query(&USER_PAGE);
        self.list(request, "users").await
    }

    pub async fn create_user(&self, realm: &str, user: &NewUserRepresentation<'_>) -> Result<()> {
        let response = self.post(&["admin", "realms", realm, "users"])?.json(user).send().await?;
        expect_status(response, StatusCode::CREATED, "user", user.username).await
    }

    pub async fn group_members(&self, realm: &str, group_id: &str) -> Result<Vec<UserRepresentation>> {
        let request =
            self.get(&["admin", "realms", realm, "groups", group_id, "members"])?.query(&USER_PAGE);
        self.list(request, "group members").await
    }

    /// Add a user to a group. Re-adding an existing member succeeds.
    pub async fn add_user_to_group(&self, realm: &str, user: &UserRepresentation, group_id: &str) -> Result<()> {
        let response = self
            .put(&["admin", "realms", realm, "users", &user.id, "groups", group_id])?
            .send()
            .await?;
        expect_status(response, StatusCode::NO_CONTENT, "group membership", &user.username).await
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    Url::parse(base_url).map_err(|e| {
        BootstrapError::validation_field(format!("Invalid identity provider URL: {}", e), "KEYCLOAK_URL")
    })
}

/// Append path segments to the base URL, percent-encoding each
fn join(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BootstrapError::config(format!("URL '{}' cannot be a base", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn expect_status(response: Response, expected: StatusCode, kind: &str, name: &str) -> Result<()> {
    let status = response.status();
    debug!("Response status: {}", status);
    if status == expected {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_else(|_| "<unable to read error>".to_string());
    trace!("Error response:\n{}", body);
    Err(BootstrapError::creation(kind, name, format!("Status code: {}", status.as_u16())))
}
