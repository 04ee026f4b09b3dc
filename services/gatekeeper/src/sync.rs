//! Catalog synchronization from a manifest.
//!
//! # Purpose
//! Brings a catalog in line with a declarative manifest. Rules are upserted by
//! [`PermissionIdentity`](warden_authz::PermissionIdentity) and each role's associations are
//! replaced with exactly the declared identities.
//!
//! # Key invariants
//! - Re-running with an unchanged manifest creates and updates nothing and changes no
//!   association.
//! - Rules that no longer appear in the manifest are detached from the roles that declared
//!   them. Their records stay in the catalog, unattached.
//! - The first declaration of an identity wins for the whole run. Later records with the
//!   same identity only add associations, so differently-formatted duplicates cannot flip
//!   the stored record back and forth between runs.
//! - Malformed rules are stored like any other record; the compiler drops them when building
//!   an ability. They are counted in the report so operators notice.
use crate::catalog::{CatalogResult, PermissionCatalog, UpsertStatus};
use crate::manifest::Manifest;
use std::collections::{BTreeSet, HashSet};
use warden_authz::RoleId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records skipped because an earlier record in the manifest had the same identity.
    pub duplicates: usize,
    /// Roles whose association set changed.
    pub associations_changed: usize,
    /// Roles whose name, associations or associated records changed.
    pub roles_changed: BTreeSet<RoleId>,
    /// Rules the compiler would drop.
    pub malformed: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.created == 0
            && self.updated == 0
            && self.associations_changed == 0
            && self.roles_changed.is_empty()
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created={} updated={} unchanged={} duplicates={} associations_changed={} roles_changed={} malformed={}",
            self.created,
            self.updated,
            self.unchanged,
            self.duplicates,
            self.associations_changed,
            self.roles_changed.len(),
            self.malformed
        )
    }
}

pub async fn synchronize(
    catalog: &dyn PermissionCatalog,
    manifest: &Manifest,
) -> CatalogResult<SyncReport> {
    let mut report = SyncReport {
        malformed: manifest.compile().diagnostics.len(),
        ..SyncReport::default()
    };

    let mut declared = HashSet::new();
    for role in &manifest.roles {
        let mut role_changed = catalog.upsert_role(&role.id, &role.name).await?;
        let mut identities = Vec::with_capacity(role.rules.len());
        for record in &role.rules {
            let identity = record.identity();
            if !declared.insert(identity.clone()) {
                report.duplicates += 1;
                identities.push(identity);
                continue;
            }
            let outcome = catalog.upsert_rule(record.clone()).await?;
            match outcome.status {
                UpsertStatus::Created => report.created += 1,
                UpsertStatus::Updated => {
                    report.updated += 1;
                    role_changed = true;
                }
                UpsertStatus::Unchanged => report.unchanged += 1,
            }
            tracing::trace!(
                role = %role.id,
                identity = %outcome.identity,
                status = outcome.status.as_str(),
                "upserted permission"
            );
            identities.push(outcome.identity);
        }
        if catalog.set_role_rules(&role.id, &identities).await? {
            report.associations_changed += 1;
            role_changed = true;
        }
        if role_changed {
            report.roles_changed.insert(role.id.clone());
        }
    }

    tracing::info!(
        backend = catalog.backend_name(),
        roles = manifest.roles.len(),
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        associations_changed = report.associations_changed,
        malformed = report.malformed,
        "catalog synchronized"
    );
    Ok(report)
}
