//! Wire representations for the identity provider's admin REST API.
//!
//! Only the fields the provisioner reads or writes are modelled; unknown
//! fields in responses are ignored.

use serde::{Deserialize, Serialize};

use crate::secrets::SecretString;

/// Token endpoint response (password grant)
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: SecretString,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmRepresentation {
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRepresentation {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRepresentation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

/// A realm role as returned by the "available realm roles" listing and
/// accepted by the realm role-mapping endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRepresentation {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A client role as returned by the UI-extension "available roles" listing.
///
/// `client_id` is the owning client's internal id, which scopes the
/// assignment endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableClientRole {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub description: Option<String>,
    pub client_id: String,
    #[serde(default)]
    pub client: Option<String>,
}

impl AvailableClientRole {
    /// Body element for the client role-mapping endpoint
    pub fn to_role(&self) -> RoleRepresentation {
        RoleRepresentation {
            id: self.id.clone(),
            name: self.role.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRepresentation {
    pub id: String,
    pub username: String,
}

/// Password credential embedded in a user creation request
#[derive(Debug, Clone, Serialize)]
pub struct CredentialRepresentation<'a> {
    #[serde(rename = "type")]
    pub credential_type: &'static str,
    pub value: &'a str,
    pub temporary: bool,
}

/// Body of a user creation request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserRepresentation<'a> {
    pub username: &'a str,
    pub enabled: bool,
    pub email: &'a str,
    pub email_verified: bool,
    pub credentials: Vec<CredentialRepresentation<'a>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_serializes_camel_case() {
        let client = ClientRepresentation {
            client_id: "todo-ui".to_string(),
            enabled: Some(true),
            redirect_uris: vec!["http://localhost:8080/*".to_string()],
        };
        let json = serde_json::to_value(&client).unwrap();
        assert_eq!(json["clientId"], "todo-ui");
        assert_eq!(json["redirectUris"][0], "http://localhost:8080/*");
    }

    #[test]
    fn test_available_client_role_maps_to_role_body() {
        let json = r#"{"id":"r1","role":"manage-users","description":"Manage users","clientId":"c-123","client":"realm-management"}"#;
        let role: AvailableClientRole = serde_json::from_str(json).unwrap();
        assert_eq!(role.client_id, "c-123");

        let body = serde_json::to_value(role.to_role()).unwrap();
        assert_eq!(body["name"], "manage-users");
        assert_eq!(body["id"], "r1");
        assert!(body.get("clientId").is_none());
    }

    #[test]
    fn test_new_user_embeds_permanent_password() {
        let user = NewUserRepresentation {
            username: "todo-admin",
            enabled: true,
            email: "admin@example.com",
            email_verified: true,
            credentials: vec![CredentialRepresentation {
                credential_type: "password",
                value: "pw",
                temporary: false,
            }],
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["emailVerified"], true);
        assert_eq!(json["credentials"][0]["type"], "password");
        assert_eq!(json["credentials"][0]["temporary"], false);
    }

    #[test]
    fn test_listing_ignores_unknown_fields() {
        let json = r#"[{"id":"g1","name":"admins","path":"/admins","subGroups":[]}]"#;
        let groups: Vec<GroupRepresentation> = serde_json::from_str(json).unwrap();
        assert_eq!(groups[0].id.as_deref(), Some("g1"));
    }
}
