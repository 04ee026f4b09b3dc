#![allow(dead_code)]

use async_trait::async_trait;
use gatekeeper::catalog::memory::InMemoryCatalog;
use gatekeeper::catalog::{
    CatalogError, CatalogResult, PermissionCatalog, StoredPermission, UpsertOutcome,
};
use gatekeeper::manifest::Manifest;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use warden_authz::{PermissionIdentity, RoleDefinition, RoleId, RuleRecord};

pub const MANIFEST_YAML: &str = r#"
roles:
  - id: admin
    name: Administrator
    rules:
      - { action: manage, subject: all }
  - id: member
    name: Member
    rules:
      - { action: read, subject: Team }
      - action: update
        subject: User
        conditions: { id: "${principal.id}" }
        fields: [firstName, lastName]
        reason: members may only edit their own profile
      - action: read
        subject: Ticket
        conditions: { assignees.id: "${principal.id}" }
  - id: bucket-reader
    name: Bucket reader
    rules:
      - action: read
        subject: Bucket
        conditions: { teamId: "${principal.teamId}" }
      - action: update
        subject: Bucket
        conditions: { teamId: "${principal.teamId}", status: { $ne: archived } }
        fields: [name]
"#;

pub fn manifest() -> Manifest {
    Manifest::from_yaml_str(MANIFEST_YAML).expect("manifest")
}

pub fn role(id: &str, rules: Vec<RuleRecord>) -> RoleDefinition {
    RoleDefinition::new(id, id, rules)
}

/// Wraps the in-memory catalog, counting role fetches and optionally failing them.
#[derive(Clone, Default)]
pub struct InstrumentedCatalog {
    inner: InMemoryCatalog,
    fetches: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl InstrumentedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PermissionCatalog for InstrumentedCatalog {
    async fn fetch_roles(&self, role_ids: &[RoleId]) -> CatalogResult<Vec<RoleDefinition>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Unexpected(anyhow::anyhow!("catalog offline")));
        }
        self.inner.fetch_roles(role_ids).await
    }

    async fn upsert_role(&self, role_id: &RoleId, name: &str) -> CatalogResult<bool> {
        self.inner.upsert_role(role_id, name).await
    }

    async fn upsert_rule(&self, record: RuleRecord) -> CatalogResult<UpsertOutcome> {
        self.inner.upsert_rule(record).await
    }

    async fn set_role_rules(
        &self,
        role_id: &RoleId,
        identities: &[PermissionIdentity],
    ) -> CatalogResult<bool> {
        self.inner.set_role_rules(role_id, identities).await
    }

    async fn attach_rule(
        &self,
        role_id: &RoleId,
        identity: &PermissionIdentity,
    ) -> CatalogResult<bool> {
        self.inner.attach_rule(role_id, identity).await
    }

    async fn detach_rule(
        &self,
        role_id: &RoleId,
        identity: &PermissionIdentity,
    ) -> CatalogResult<bool> {
        self.inner.detach_rule(role_id, identity).await
    }

    async fn role_rules(&self, role_id: &RoleId) -> CatalogResult<Vec<PermissionIdentity>> {
        self.inner.role_rules(role_id).await
    }

    async fn list_identities(&self) -> CatalogResult<Vec<PermissionIdentity>> {
        self.inner.list_identities().await
    }

    async fn list_permissions(&self) -> CatalogResult<Vec<StoredPermission>> {
        self.inner.list_permissions().await
    }

    async fn health_check(&self) -> CatalogResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Unexpected(anyhow::anyhow!("catalog offline")));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "instrumented"
    }
}
