//! Policy service wiring.
//!
//! # Purpose
//! Holds the catalog and the enforcement gate together so every catalog mutation made through
//! it also invalidates the cached abilities it affects.
//!
//! # Notes
//! Writing to the catalog directly, bypassing this type, leaves the gate cache stale until
//! [`EnforcementGate::invalidate_all`] is called.
use crate::catalog::memory::InMemoryCatalog;
use crate::catalog::{CatalogResult, PermissionCatalog, UpsertOutcome, UpsertStatus};
use crate::config::GatekeeperConfig;
use crate::gate::{EnforcementGate, GateOutcome, Requirement, Session};
use crate::manifest::Manifest;
use crate::sync::{SyncReport, synchronize};
use serde_json::Value;
use std::sync::Arc;
use warden_authz::{Action, AuthzResult, FieldSet, PermissionIdentity, RoleId, RuleRecord};

#[derive(Clone)]
pub struct PolicyService {
    catalog: Arc<dyn PermissionCatalog>,
    gate: Arc<EnforcementGate>,
}

impl PolicyService {
    pub fn new(catalog: Arc<dyn PermissionCatalog>, config: &GatekeeperConfig) -> Self {
        let gate = Arc::new(EnforcementGate::new(
            catalog.clone(),
            config.cache_max_entries,
        ));
        Self { catalog, gate }
    }

    pub fn in_memory(config: &GatekeeperConfig) -> Self {
        Self::new(Arc::new(InMemoryCatalog::new()), config)
    }

    pub fn catalog(&self) -> &Arc<dyn PermissionCatalog> {
        &self.catalog
    }

    pub fn gate(&self) -> &Arc<EnforcementGate> {
        &self.gate
    }

    pub async fn synchronize(&self, manifest: &Manifest) -> CatalogResult<SyncReport> {
        let report = match synchronize(self.catalog.as_ref(), manifest).await {
            Ok(report) => report,
            Err(err) => {
                // A partial run may already have changed some roles.
                self.gate.invalidate_all();
                return Err(err);
            }
        };
        if report.updated > 0 {
            // Updated records may be held by roles outside the manifest.
            self.gate.invalidate_all();
        } else if !report.roles_changed.is_empty() {
            let roles: Vec<RoleId> = report.roles_changed.iter().cloned().collect();
            self.gate.invalidate_roles(&roles);
        }
        Ok(report)
    }

    /// Store `record` and attach it to `role_id`.
    pub async fn grant(&self, role_id: &RoleId, record: RuleRecord) -> CatalogResult<UpsertOutcome> {
        // Fail before writing anything if the role does not exist.
        self.catalog.role_rules(role_id).await?;
        let outcome = self.catalog.upsert_rule(record).await?;
        let attached = self.catalog.attach_rule(role_id, &outcome.identity).await?;
        if outcome.status == UpsertStatus::Updated {
            self.gate.invalidate_all();
        } else if attached {
            self.gate.invalidate_roles(std::slice::from_ref(role_id));
        }
        tracing::info!(
            role = %role_id,
            identity = %outcome.identity,
            status = outcome.status.as_str(),
            attached,
            "permission granted"
        );
        Ok(outcome)
    }

    /// Detach `identity` from `role_id`. Returns `false` if the role did not hold it.
    pub async fn revoke(
        &self,
        role_id: &RoleId,
        identity: &PermissionIdentity,
    ) -> CatalogResult<bool> {
        let detached = self.catalog.detach_rule(role_id, identity).await?;
        if detached {
            self.gate.invalidate_roles(std::slice::from_ref(role_id));
            tracing::info!(role = %role_id, %identity, "permission revoked");
        }
        Ok(detached)
    }

    pub async fn evaluate(
        &self,
        session: Option<&Session>,
        action: Action,
        subject: &str,
        resource: Option<&Value>,
    ) -> GateOutcome {
        self.gate.evaluate(session, action, subject, resource).await
    }

    pub async fn authorize(
        &self,
        session: Option<&Session>,
        action: Action,
        subject: &str,
        resource: Option<&Value>,
    ) -> AuthzResult<FieldSet> {
        self.gate.authorize(session, action, subject, resource).await
    }

    pub async fn enforce(
        &self,
        session: Option<&Session>,
        requirements: &[Requirement],
        resource: Option<&Value>,
    ) -> AuthzResult<FieldSet> {
        self.gate.enforce(session, requirements, resource).await
    }

    pub async fn health_check(&self) -> CatalogResult<()> {
        self.catalog.health_check().await
    }
}
