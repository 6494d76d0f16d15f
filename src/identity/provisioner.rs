//! # Identity Provisioner
//!
//! Realm, client, admin group, role bindings, admin user and group
//! membership, in that order. Listing failures abort the pipeline; a failed
//! creation is recorded and the next item is attempted. The group is the
//! exception: every later step needs its id, so failing to obtain it is
//! fatal.

use std::collections::HashSet;

use tracing::Instrument;

use super::client::KeycloakAdminClient;
use super::dto::{ClientRepresentation, CredentialRepresentation, NewUserRepresentation, UserRepresentation};
use crate::config::{IdentitySettings, MembershipPolicy};
use crate::errors::{BootstrapError, Result};
use crate::reconcile::{reconcile, ReconcileReport, ReconciliationOutcome, ResourceDescriptor, ResourceKind};

pub struct IdentityProvisioner<'a> {
    settings: &'a IdentitySettings,
    client: KeycloakAdminClient,
}

impl<'a> IdentityProvisioner<'a> {
    pub fn new(settings: &'a IdentitySettings, client: KeycloakAdminClient) -> Self {
        Self { settings, client }
    }

    pub async fn run(&self, report: &mut ReconcileReport) -> Result<()> {
        let span = crate::pipeline_span!("identity", realm = %self.settings.realm);
        async move {
            self.ensure_realm(report).await?;
            self.ensure_client(report).await?;
            let group_id = self.ensure_group(report).await?;
            self.ensure_role_bindings(&group_id, report).await?;
            self.ensure_admin_user(report).await?;
            self.ensure_memberships(&group_id, report).await
        }
        .instrument(span)
        .await
    }

    async fn ensure_realm(&self, report: &mut ReconcileReport) -> Result<()> {
        let realm = &self.settings.realm;
        let descriptor = ResourceDescriptor::new(ResourceKind::Realm, realm);
        let outcome = reconcile(
            &descriptor,
            || async {
                let realms = self.client.list_realms().await?;
                Ok(realms.iter().any(|r| &r.realm == realm))
            },
            || self.client.create_realm(realm),
        )
        .await?;
        report.record(descriptor, outcome);
        Ok(())
    }

    async fn ensure_client(&self, report: &mut ReconcileReport) -> Result<()> {
        let realm = &self.settings.realm;
        let client_id = &self.settings.client_id;
        let descriptor = ResourceDescriptor::new(ResourceKind::Client, client_id)
            .in_scope(realm)
            .with_attribute("redirect_uri", &self.settings.client_redirect_uri);
        let body = ClientRepresentation {
            client_id: client_id.clone(),
            enabled: Some(true),
            redirect_uris: vec![self.settings.client_redirect_uri.clone()],
        };

        let outcome = reconcile(
            &descriptor,
            || async {
                let clients = self.client.list_clients(realm).await?;
                Ok(clients.iter().any(|c| &c.client_id == client_id))
            },
            || self.client.create_client(realm, &body),
        )
        .await?;
        report.record(descriptor, outcome);
        Ok(())
    }

    async fn find_group_id(&self) -> Result<Option<String>> {
        let groups = self.client.list_groups(&self.settings.realm).await?;
        Ok(groups
            .into_iter()
            .find(|g| g.name == self.settings.admin_group)
            .and_then(|g| g.id))
    }

    /// Ensure the admin group and return its internal id.
    ///
    /// The creation response is not trusted to carry the id, so the group
    /// listing is consulted again after a successful creation.
    async fn ensure_group(&self, report: &mut ReconcileReport) -> Result<String> {
        let realm = &self.settings.realm;
        let name = &self.settings.admin_group;
        let descriptor = ResourceDescriptor::new(ResourceKind::Group, name).in_scope(realm);

        let existing = self.find_group_id().await?;
        let found = existing.is_some();
        let outcome = reconcile(
            &descriptor,
            || async move { Ok(found) },
            || self.client.create_group(realm, name),
        )
        .await?;

        let group_id = match (&outcome, existing) {
            (ReconciliationOutcome::AlreadyExists, Some(id)) => Some(id),
            (ReconciliationOutcome::Created, _) => self.find_group_id().await?,
            _ => None,
        };
        let failure = outcome.clone();
        report.record(descriptor, outcome);

        match group_id {
            Some(id) => {
                tracing::debug!(group = %name, group_id = %id, "Resolved admin group id");
                Ok(id)
            }
            None => Err(match failure {
                ReconciliationOutcome::Failed(reason) => BootstrapError::creation("group", name.as_str(), reason),
                _ => BootstrapError::internal(format!(
                    "Group '{}' was created but is missing from the group listing",
                    name
                )),
            }),
        }
    }

    async fn ensure_role_bindings(&self, group_id: &str, report: &mut ReconcileReport) -> Result<()> {
        let realm = &self.settings.realm;
        let group = &self.settings.admin_group;

        // Both tiers are listed before anything is assigned.
        let realm_roles = self.client.available_realm_roles(realm, group_id).await?;
        let client_roles = self.client.available_client_roles(realm, group_id).await?;

        let descriptor = ResourceDescriptor::new(ResourceKind::RoleBinding, "realm-roles")
            .in_scope(group)
            .with_attribute("count", realm_roles.len().to_string());
        // Nothing available means everything is already mapped.
        let already_assigned = realm_roles.is_empty();
        let outcome = reconcile(
            &descriptor,
            || async move { Ok(already_assigned) },
            || self.client.assign_realm_roles(realm, group_id, &realm_roles),
        )
        .await?;
        report.record(descriptor, outcome);

        if client_roles.is_empty() {
            let descriptor =
                ResourceDescriptor::new(ResourceKind::RoleBinding, "client-roles").in_scope(group);
            let outcome = reconcile(&descriptor, || async { Ok(true) }, || async { Ok(()) }).await?;
            report.record(descriptor, outcome);
            return Ok(());
        }

        for role in &client_roles {
            let owner = role.client.as_deref().unwrap_or(&role.client_id);
            let descriptor =
                ResourceDescriptor::new(ResourceKind::RoleBinding, format!("{}:{}", owner, role.role))
                    .in_scope(group);
            // Present in the "available" listing means not yet mapped.
            let outcome = reconcile(
                &descriptor,
                || async { Ok(false) },
                || self.client.assign_client_role(realm, group_id, role),
            )
            .await?;
            report.record(descriptor, outcome);
        }
        Ok(())
    }

    async fn ensure_admin_user(&self, report: &mut ReconcileReport) -> Result<()> {
        let realm = &self.settings.realm;
        let username = &self.settings.admin_username;
        let descriptor = ResourceDescriptor::new(ResourceKind::User, username)
            .in_scope(realm)
            .with_attribute("email", &self.settings.admin_email);
        let body = NewUserRepresentation {
            username,
            enabled: true,
            email: &self.settings.admin_email,
            email_verified: true,
            credentials: vec![CredentialRepresentation {
                credential_type: "password",
                value: self.settings.admin_password.expose_secret(),
                temporary: false,
            }],
        };

        let outcome = reconcile(
            &descriptor,
            || async {
                let users = self.client.list_users(realm).await?;
                Ok(users.iter().any(|u| u.username.eq_ignore_ascii_case(username)))
            },
            || self.client.create_user(realm, &body),
        )
        .await?;
        report.record(descriptor, outcome);
        Ok(())
    }

    /// Users the membership policy places in the admin group
    fn membership_candidates(&self, users: Vec<UserRepresentation>) -> Vec<UserRepresentation> {
        match self.settings.membership_policy {
            MembershipPolicy::PromoteAllRealmUsers => users,
            MembershipPolicy::AdminUserOnly => users
                .into_iter()
                .filter(|u| u.username.eq_ignore_ascii_case(&self.settings.admin_username))
                .collect(),
        }
    }

    async fn ensure_memberships(&self, group_id: &str, report: &mut ReconcileReport) -> Result<()> {
        let realm = &self.settings.realm;
        let group = &self.settings.admin_group;

        let users = self.client.list_users(realm).await?;
        let candidates = self.membership_candidates(users);
        if candidates.is_empty() {
            tracing::warn!(group = %group, policy = ?self.settings.membership_policy, "No users to add to group");
            return Ok(());
        }

        let members: HashSet<String> =
            self.client.group_members(realm, group_id).await?.into_iter().map(|u| u.id).collect();

        for user in &candidates {
            let descriptor = ResourceDescriptor::new(ResourceKind::GroupMembership, &user.username).in_scope(group);
            let is_member = members.contains(&user.id);
            let outcome = reconcile(
                &descriptor,
                || async move { Ok(is_member) },
                || self.client.add_user_to_group(realm, user, group_id),
            )
            .await?;
            report.record(descriptor, outcome);
        }
        Ok(())
    }
}
