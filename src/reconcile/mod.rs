//! # Resource Reconciliation
//!
//! The check-then-converge primitive shared by every provisioner. A
//! reconciliation queries the target system for a resource by its natural key
//! and, only if it is absent, performs exactly one creation attempt. Existing
//! resources are never updated.
//!
//! ```rust,ignore
//! let descriptor = ResourceDescriptor::new(ResourceKind::Realm, "todo");
//! let outcome = reconcile(
//!     &descriptor,
//!     || client.realm_exists("todo"),
//!     || client.create_realm("todo"),
//! )
//! .await?;
//! ```
//!
//! There is no locking between the lookup and the creation call. Two
//! concurrent runs against the same target can both observe "absent".

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use serde::Serialize;
use tracing::Instrument;

use crate::errors::Result;

/// Kind of resource handled by a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Role,
    Database,
    Schema,
    Realm,
    Client,
    Group,
    RoleBinding,
    User,
    GroupMembership,
    SecretsEngine,
    Policy,
    AuthMethod,
    SecretsUser,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Role => "role",
            ResourceKind::Database => "database",
            ResourceKind::Schema => "schema",
            ResourceKind::Realm => "realm",
            ResourceKind::Client => "client",
            ResourceKind::Group => "group",
            ResourceKind::RoleBinding => "role-binding",
            ResourceKind::User => "user",
            ResourceKind::GroupMembership => "group-membership",
            ResourceKind::SecretsEngine => "secrets-engine",
            ResourceKind::Policy => "policy",
            ResourceKind::AuthMethod => "auth-method",
            ResourceKind::SecretsUser => "secrets-user",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and desired attributes of one target resource.
///
/// The natural key (unique within `scope`) is the only thing existence
/// checks look at. Attributes are carried for narration and creation only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    kind: ResourceKind,
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    pub fn new(kind: ResourceKind, key: impl Into<String>) -> Self {
        Self { kind, key: key.into(), scope: None, attributes: BTreeMap::new() }
    }

    /// Parent scope of the natural key (the realm of a client, the mount of a user)
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{} '{}/{}'", self.kind, scope, self.key),
            None => write!(f, "{} '{}'", self.kind, self.key),
        }
    }
}

/// Result of a single reconciliation. There is deliberately no `Updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    AlreadyExists,
    Created,
    Failed(String),
}

impl ReconciliationOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ReconciliationOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconciliationOutcome::AlreadyExists => "already-exists",
            ReconciliationOutcome::Created => "created",
            ReconciliationOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ReconciliationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Ensure a resource exists.
///
/// `exists` is always called first. If it reports `true`, `create` is never
/// invoked. Otherwise `create` runs exactly once; a creation fault from it
/// becomes [`ReconciliationOutcome::Failed`], while a fatal fault (see
/// [`BootstrapError::is_fatal`]) is returned. An `Err` from `exists` is
/// returned as is, since existence cannot be decided.
///
/// [`BootstrapError::is_fatal`]: crate::errors::BootstrapError::is_fatal
pub async fn reconcile<E, EF, C, CF>(
    descriptor: &ResourceDescriptor,
    exists: E,
    create: C,
) -> Result<ReconciliationOutcome>
where
    E: FnOnce() -> EF,
    EF: Future<Output = Result<bool>>,
    C: FnOnce() -> CF,
    CF: Future<Output = Result<()>>,
{
    let span = crate::reconcile_span!(descriptor.kind(), descriptor.key());

    async move {
        if exists().await? {
            tracing::info!("{} already exists, skipping", descriptor);
            return Ok(ReconciliationOutcome::AlreadyExists);
        }

        tracing::info!("{} does not exist, creating", descriptor);
        match create().await {
            Ok(()) => {
                tracing::info!("{} created successfully", descriptor);
                Ok(ReconciliationOutcome::Created)
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, category = %e.category(), "Aborting while creating {}", descriptor);
                Err(e)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create {}", descriptor);
                Ok(ReconciliationOutcome::Failed(e.to_string()))
            }
        }
    }
    .instrument(span)
    .await
}

/// One reconciled resource and what happened to it
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileRecord {
    pub descriptor: ResourceDescriptor,
    pub outcome: ReconciliationOutcome,
}

/// Ordered log of the reconciliations performed by one pipeline
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pipeline: String,
    records: Vec<ReconcileRecord>,
}

impl ReconcileReport {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self { pipeline: pipeline.into(), records: Vec::new() }
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn record(&mut self, descriptor: ResourceDescriptor, outcome: ReconciliationOutcome) {
        self.records.push(ReconcileRecord { descriptor, outcome });
    }

    pub fn records(&self) -> &[ReconcileRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Outcomes recorded for a given kind, in execution order
    pub fn outcomes_for(&self, kind: ResourceKind) -> Vec<&ReconciliationOutcome> {
        self.records
            .iter()
            .filter(|r| r.descriptor.kind() == kind)
            .map(|r| &r.outcome)
            .collect()
    }

    pub fn created_count(&self) -> usize {
        self.records.iter().filter(|r| r.outcome == ReconciliationOutcome::Created).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReconcileRecord> {
        self.records.iter().filter(|r| r.outcome.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// True when every recorded resource was already present
    pub fn all_existing(&self) -> bool {
        self.records.iter().all(|r| r.outcome == ReconciliationOutcome::AlreadyExists)
    }
}
