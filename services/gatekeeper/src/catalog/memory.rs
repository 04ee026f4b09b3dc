//! In-memory permission catalog.
//!
//! # Purpose
//! Implements [`PermissionCatalog`] with `HashMap`s guarded by `tokio::sync::RwLock`. Used by
//! tests, by the CLI, and by deployments that load their catalog from a manifest at startup.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - Roles and permissions live behind one lock so an association can never point at a
//!   record that a concurrent writer has not stored yet.
//! - Reads are concurrent; writes are serialized.
use super::{
    CatalogError, CatalogResult, PermissionCatalog, StoredPermission, UpsertOutcome, UpsertStatus,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use warden_authz::{PermissionIdentity, RoleDefinition, RoleId, RuleRecord};

#[derive(Debug)]
struct RoleEntry {
    name: String,
    /// Association order is kept; it is the order rules are compiled in.
    permissions: Vec<PermissionIdentity>,
}

#[derive(Debug, Default)]
struct CatalogState {
    next_id: u64,
    roles: HashMap<RoleId, RoleEntry>,
    permissions: HashMap<PermissionIdentity, StoredPermission>,
}

impl CatalogState {
    fn role_mut(&mut self, role_id: &RoleId) -> CatalogResult<&mut RoleEntry> {
        self.roles
            .get_mut(role_id)
            .ok_or_else(|| CatalogError::NotFound(format!("role {role_id}")))
    }

    fn ensure_permission(&self, identity: &PermissionIdentity) -> CatalogResult<()> {
        if self.permissions.contains_key(identity) {
            Ok(())
        } else {
            Err(CatalogError::NotFound(format!("permission {identity}")))
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionCatalog for InMemoryCatalog {
    async fn fetch_roles(&self, role_ids: &[RoleId]) -> CatalogResult<Vec<RoleDefinition>> {
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        let mut roles = Vec::with_capacity(role_ids.len());
        for role_id in role_ids {
            if !seen.insert(role_id) {
                continue;
            }
            let Some(entry) = state.roles.get(role_id) else {
                continue;
            };
            let rules = entry
                .permissions
                .iter()
                .filter_map(|identity| state.permissions.get(identity))
                .map(|stored| stored.record.clone())
                .collect();
            roles.push(RoleDefinition {
                id: role_id.clone(),
                name: entry.name.clone(),
                rules,
            });
        }
        Ok(roles)
    }

    async fn upsert_role(&self, role_id: &RoleId, name: &str) -> CatalogResult<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        match state.roles.get_mut(role_id) {
            Some(entry) if entry.name == name => Ok(false),
            Some(entry) => {
                entry.name = name.to_string();
                Ok(true)
            }
            None => {
                state.roles.insert(
                    role_id.clone(),
                    RoleEntry {
                        name: name.to_string(),
                        permissions: Vec::new(),
                    },
                );
                Ok(true)
            }
        }
    }

    async fn upsert_rule(&self, record: RuleRecord) -> CatalogResult<UpsertOutcome> {
        let identity = record.identity();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let status = match state.permissions.get_mut(&identity) {
            Some(stored) if stored.record == record => UpsertStatus::Unchanged,
            Some(stored) => {
                // Same identity, different presentation (reason, key order): update in place.
                stored.record = record;
                UpsertStatus::Updated
            }
            None => {
                let id = state.next_id;
                state.next_id += 1;
                state.permissions.insert(
                    identity.clone(),
                    StoredPermission {
                        id,
                        identity: identity.clone(),
                        record,
                    },
                );
                UpsertStatus::Created
            }
        };
        Ok(UpsertOutcome { identity, status })
    }

    async fn set_role_rules(
        &self,
        role_id: &RoleId,
        identities: &[PermissionIdentity],
    ) -> CatalogResult<bool> {
        let mut state = self.state.write().await;
        for identity in identities {
            state.ensure_permission(identity)?;
        }
        let mut seen = HashSet::new();
        let desired: Vec<PermissionIdentity> = identities
            .iter()
            .filter(|identity| seen.insert(*identity))
            .cloned()
            .collect();
        let entry = state.role_mut(role_id)?;
        if entry.permissions == desired {
            return Ok(false);
        }
        entry.permissions = desired;
        Ok(true)
    }

    async fn attach_rule(
        &self,
        role_id: &RoleId,
        identity: &PermissionIdentity,
    ) -> CatalogResult<bool> {
        let mut state = self.state.write().await;
        state.ensure_permission(identity)?;
        let entry = state.role_mut(role_id)?;
        if entry.permissions.contains(identity) {
            return Ok(false);
        }
        entry.permissions.push(identity.clone());
        Ok(true)
    }

    async fn detach_rule(
        &self,
        role_id: &RoleId,
        identity: &PermissionIdentity,
    ) -> CatalogResult<bool> {
        let mut state = self.state.write().await;
        let entry = state.role_mut(role_id)?;
        let before = entry.permissions.len();
        entry.permissions.retain(|existing| existing != identity);
        Ok(entry.permissions.len() != before)
    }

    async fn role_rules(&self, role_id: &RoleId) -> CatalogResult<Vec<PermissionIdentity>> {
        let state = self.state.read().await;
        state
            .roles
            .get(role_id)
            .map(|entry| entry.permissions.clone())
            .ok_or_else(|| CatalogError::NotFound(format!("role {role_id}")))
    }

    async fn list_identities(&self) -> CatalogResult<Vec<PermissionIdentity>> {
        let state = self.state.read().await;
        let mut identities: Vec<_> = state.permissions.keys().cloned().collect();
        identities.sort();
        Ok(identities)
    }

    async fn list_permissions(&self) -> CatalogResult<Vec<StoredPermission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<_> = state.permissions.values().cloned().collect();
        permissions.sort_by_key(|stored| stored.id);
        Ok(permissions)
    }

    async fn health_check(&self) -> CatalogResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner_rule() -> RuleRecord {
        RuleRecord::new("update", "User")
            .with_conditions(json!({"id": "${principal.id}"}))
            .with_fields(["firstName", "lastName"])
    }

    #[tokio::test]
    async fn upsert_rule_is_keyed_by_identity() {
        let catalog = InMemoryCatalog::new();
        let first = catalog.upsert_rule(owner_rule()).await.expect("create");
        assert_eq!(first.status, UpsertStatus::Created);

        let again = catalog.upsert_rule(owner_rule()).await.expect("repeat");
        assert_eq!(again.status, UpsertStatus::Unchanged);
        assert_eq!(again.identity, first.identity);

        let reordered = RuleRecord::new("update", "User")
            .with_conditions(json!({"id": "${principal.id}"}))
            .with_fields(["lastName", "firstName"]);
        let updated = catalog.upsert_rule(reordered).await.expect("update");
        assert_eq!(updated.status, UpsertStatus::Updated);
        assert_eq!(updated.identity, first.identity);

        let stored = catalog.list_permissions().await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, 0);
    }

    #[tokio::test]
    async fn fetch_roles_follows_associations() {
        let catalog = InMemoryCatalog::new();
        let member = RoleId::new("member");
        assert!(catalog.upsert_role(&member, "Member").await.expect("role"));
        assert!(!catalog.upsert_role(&member, "Member").await.expect("role"));

        let read = catalog
            .upsert_rule(RuleRecord::new("read", "Team"))
            .await
            .expect("rule");
        let update = catalog.upsert_rule(owner_rule()).await.expect("rule");
        let changed = catalog
            .set_role_rules(
                &member,
                &[
                    update.identity.clone(),
                    read.identity.clone(),
                    update.identity.clone(),
                ],
            )
            .await
            .expect("associate");
        assert!(changed);
        assert_eq!(
            catalog.role_rules(&member).await.expect("rules"),
            vec![update.identity.clone(), read.identity.clone()]
        );

        let roles = catalog
            .fetch_roles(&[member.clone(), RoleId::new("ghost"), member.clone()])
            .await
            .expect("fetch");
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].rules, vec![owner_rule(), RuleRecord::new("read", "Team")]);

        let flattened = catalog
            .fetch_rules_for_roles(&[member.clone()])
            .await
            .expect("rules");
        assert_eq!(flattened.len(), 2);
    }

    #[tokio::test]
    async fn set_role_rules_reports_drift_only() {
        let catalog = InMemoryCatalog::new();
        let role = RoleId::new("auditor");
        catalog.upsert_role(&role, "Auditor").await.expect("role");
        let read = catalog
            .upsert_rule(RuleRecord::new("read", "all"))
            .await
            .expect("rule");
        assert!(
            catalog
                .set_role_rules(&role, &[read.identity.clone()])
                .await
                .expect("set")
        );
        assert!(
            !catalog
                .set_role_rules(&role, &[read.identity.clone()])
                .await
                .expect("set")
        );
    }

    #[tokio::test]
    async fn unknown_role_and_identity_are_not_found() {
        let catalog = InMemoryCatalog::new();
        let orphan = RuleRecord::new("read", "Team").identity();
        let err = catalog
            .set_role_rules(&RoleId::new("nobody"), &[])
            .await
            .expect_err("missing role");
        assert!(matches!(err, CatalogError::NotFound(_)));

        let role = RoleId::new("member");
        catalog.upsert_role(&role, "Member").await.expect("role");
        let err = catalog
            .attach_rule(&role, &orphan)
            .await
            .expect_err("missing permission");
        assert!(matches!(err, CatalogError::NotFound(_)));
        assert!(matches!(
            catalog.role_rules(&RoleId::new("nobody")).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn attach_and_detach_are_idempotent() {
        let catalog = InMemoryCatalog::new();
        let role = RoleId::new("member");
        catalog.upsert_role(&role, "Member").await.expect("role");
        let read = catalog
            .upsert_rule(RuleRecord::new("read", "Team"))
            .await
            .expect("rule");
        assert!(catalog.attach_rule(&role, &read.identity).await.expect("attach"));
        assert!(!catalog.attach_rule(&role, &read.identity).await.expect("attach"));
        assert!(catalog.detach_rule(&role, &read.identity).await.expect("detach"));
        assert!(!catalog.detach_rule(&role, &read.identity).await.expect("detach"));
        assert_eq!(catalog.list_identities().await.expect("list").len(), 1);
        catalog.health_check().await.expect("health");
        assert_eq!(catalog.backend_name(), "memory");
    }
}
