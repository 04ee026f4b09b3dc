//! Permission catalog interface.
//!
//! # Purpose
//! A catalog stores roles, permission records keyed by [`PermissionIdentity`], and the
//! associations between them. The enforcement gate reads role definitions from it; the
//! synchronizer and administrative mutations write to it.
//!
//! # Key invariants
//! - A permission record is stored at most once per identity. `upsert_rule` updates the
//!   existing record in place and keeps its id.
//! - Role associations reference identities, never copies of records, so updating a record
//!   is visible to every role holding it.
//! - `fetch_roles` skips unknown role ids instead of failing; an unknown role grants nothing.
use async_trait::async_trait;
use thiserror::Error;
use warden_authz::{PermissionIdentity, RoleDefinition, RoleId, RuleRecord};

pub mod memory;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatus {
    Created,
    Updated,
    Unchanged,
}

impl UpsertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UpsertStatus::Created => "created",
            UpsertStatus::Updated => "updated",
            UpsertStatus::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub identity: PermissionIdentity,
    pub status: UpsertStatus,
}

/// A permission record as the catalog holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPermission {
    /// Backend-assigned id, stable across in-place updates.
    pub id: u64,
    pub identity: PermissionIdentity,
    pub record: RuleRecord,
}

#[async_trait]
pub trait PermissionCatalog: Send + Sync {
    /// Roles with their rules in association order. Unknown ids are skipped.
    async fn fetch_roles(&self, role_ids: &[RoleId]) -> CatalogResult<Vec<RoleDefinition>>;

    /// Flattened rules of `role_ids`, in role then association order.
    async fn fetch_rules_for_roles(&self, role_ids: &[RoleId]) -> CatalogResult<Vec<RuleRecord>> {
        let roles = self.fetch_roles(role_ids).await?;
        Ok(roles.into_iter().flat_map(|role| role.rules).collect())
    }

    /// Create the role or rename it. Returns whether anything changed.
    async fn upsert_role(&self, role_id: &RoleId, name: &str) -> CatalogResult<bool>;

    async fn upsert_rule(&self, record: RuleRecord) -> CatalogResult<UpsertOutcome>;

    /// Replace the role's associations with exactly `identities`, de-duplicated in order.
    /// Returns whether the association set changed.
    ///
    /// # Errors
    /// [`CatalogError::NotFound`] for an unknown role or an identity with no stored record.
    async fn set_role_rules(
        &self,
        role_id: &RoleId,
        identities: &[PermissionIdentity],
    ) -> CatalogResult<bool>;

    /// Add one association. Returns `false` if it already existed.
    async fn attach_rule(
        &self,
        role_id: &RoleId,
        identity: &PermissionIdentity,
    ) -> CatalogResult<bool>;

    /// Remove one association. Returns `false` if it did not exist.
    async fn detach_rule(
        &self,
        role_id: &RoleId,
        identity: &PermissionIdentity,
    ) -> CatalogResult<bool>;

    async fn role_rules(&self, role_id: &RoleId) -> CatalogResult<Vec<PermissionIdentity>>;

    /// Every stored identity, sorted.
    async fn list_identities(&self) -> CatalogResult<Vec<PermissionIdentity>>;

    async fn list_permissions(&self) -> CatalogResult<Vec<StoredPermission>>;

    async fn health_check(&self) -> CatalogResult<()>;

    fn backend_name(&self) -> &'static str;
}
