mod common;

use common::{InstrumentedCatalog, MANIFEST_YAML, manifest, role};
use gatekeeper::catalog::PermissionCatalog;
use gatekeeper::catalog::memory::InMemoryCatalog;
use gatekeeper::manifest::Manifest;
use gatekeeper::sync::synchronize;
use serde_json::json;
use std::collections::BTreeMap;
use warden_authz::{PermissionIdentity, RoleId, RuleRecord};

async fn associations(
    catalog: &dyn PermissionCatalog,
    manifest: &Manifest,
) -> BTreeMap<RoleId, Vec<PermissionIdentity>> {
    let mut associations = BTreeMap::new();
    for role in &manifest.roles {
        let rules = catalog.role_rules(&role.id).await.expect("role rules");
        associations.insert(role.id.clone(), rules);
    }
    associations
}

#[tokio::test]
async fn resynchronizing_an_unchanged_manifest_is_a_noop() {
    let catalog = InMemoryCatalog::new();
    let manifest = manifest();

    let first = synchronize(&catalog, &manifest).await.expect("first run");
    assert_eq!(first.created, 6);
    assert_eq!(first.associations_changed, 3);
    let identities = catalog.list_identities().await.expect("identities");
    let permissions = catalog.list_permissions().await.expect("permissions");
    let roles = associations(&catalog, &manifest).await;

    let second = synchronize(&catalog, &manifest).await.expect("second run");
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 6);
    assert_eq!(second.associations_changed, 0);
    assert!(second.is_noop());

    assert_eq!(catalog.list_identities().await.expect("identities"), identities);
    assert_eq!(catalog.list_permissions().await.expect("permissions"), permissions);
    assert_eq!(associations(&catalog, &manifest).await, roles);
}

#[tokio::test]
async fn reparsed_manifest_keeps_identities() {
    let catalog = InMemoryCatalog::new();
    synchronize(&catalog, &manifest()).await.expect("yaml run");

    // The same rules with keys, fields and condition nesting written differently.
    let rewritten = Manifest::from_json_str(
        &json!({
            "roles": [
                {"id": "admin", "name": "Administrator", "rules": [
                    {"subject": "all", "action": "manage"}
                ]},
                {"id": "member", "name": "Member", "rules": [
                    {"subject": "Team", "action": "read"},
                    {"action": "update", "subject": "User",
                     "fields": ["lastName", "firstName"],
                     "conditions": {"id": {"$eq": "${principal.id}"}},
                     "reason": "members may only edit their own profile"},
                    {"action": "read", "subject": "Ticket",
                     "conditions": {"assignees": {"id": "${principal.id}"}}}
                ]},
                {"id": "bucket-reader", "name": "Bucket reader", "rules": [
                    {"action": "read", "subject": "Bucket",
                     "conditions": {"teamId": "${principal.teamId}"}},
                    {"action": "update", "subject": "Bucket", "fields": ["name"],
                     "conditions": {"status": {"$ne": "archived"}, "teamId": "${principal.teamId}"}}
                ]}
            ]
        })
        .to_string(),
    )
    .expect("json manifest");

    let report = synchronize(&catalog, &rewritten).await.expect("json run");
    assert_eq!(report.created, 0);
    assert_eq!(report.associations_changed, 0);
    assert_eq!(catalog.list_identities().await.expect("identities").len(), 6);
}

#[tokio::test]
async fn changed_rule_creates_and_reassociates() {
    let catalog = InMemoryCatalog::new();
    let before = Manifest {
        roles: vec![role(
            "member",
            vec![RuleRecord::new("update", "User").with_fields(["firstName"])],
        )],
    };
    synchronize(&catalog, &before).await.expect("first");

    let after = Manifest {
        roles: vec![role(
            "member",
            vec![RuleRecord::new("update", "User").with_fields(["firstName", "lastName"])],
        )],
    };
    let report = synchronize(&catalog, &after).await.expect("second");
    assert_eq!(report.created, 1);
    assert_eq!(report.associations_changed, 1);
    assert!(report.roles_changed.contains(&RoleId::new("member")));

    let member = catalog
        .role_rules(&RoleId::new("member"))
        .await
        .expect("rules");
    assert_eq!(member, vec![after.roles[0].rules[0].identity()]);
}

#[tokio::test]
async fn shared_rules_are_stored_once() {
    let catalog = InstrumentedCatalog::new();
    let shared = RuleRecord::new("read", "Team");
    let manifest = Manifest {
        roles: vec![
            role("a", vec![shared.clone()]),
            role("b", vec![shared.clone(), RuleRecord::new("read", "User")]),
        ],
    };
    let report = synchronize(&catalog, &manifest).await.expect("sync");
    assert_eq!(report.created, 2);
    assert_eq!(report.duplicates, 1);
    assert_eq!(catalog.list_identities().await.expect("list").len(), 2);
    assert_eq!(
        catalog.role_rules(&RoleId::new("a")).await.expect("a"),
        vec![shared.identity()]
    );
}

#[test]
fn shipped_manifest_compiles_cleanly() {
    let manifest = Manifest::from_yaml_str(MANIFEST_YAML).expect("manifest");
    let compiled = manifest.compile();
    assert!(compiled.diagnostics.is_empty());
    assert_eq!(compiled.ability.len(), 6);
}
