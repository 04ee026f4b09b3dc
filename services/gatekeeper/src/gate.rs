//! Enforcement gate.
//!
//! # Purpose
//! Turns a request's session and declared requirements into an authorization outcome. The
//! gate resolves the session's roles into a cached [`CompiledAbility`] and delegates the
//! decision to the evaluator.
//!
//! # Key invariants
//! - No session means `Unauthenticated`; the catalog is not consulted.
//! - Any catalog failure resolves to `Forbidden`. Nothing in this module turns an error
//!   into an allow.
//! - Cached abilities are immutable snapshots. Invalidation removes entries; rebuilds insert
//!   a fresh `Arc`, so readers see either the old or the new ability.
//! - A rebuild that overlaps an invalidation is handed to its caller but does not stay cached.
//!
//! # Security considerations
//! - Denial reasons are logged at `debug` and carried on [`AuthzError::Forbidden`], whose
//!   `Display` omits them. Callers must not forward the reason to end users.
use crate::catalog::{CatalogResult, PermissionCatalog};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use warden_authz::{
    Ability, Action, AuthzError, AuthzResult, CompiledAbility, Decision, FieldSet, Principal,
    RoleId, compile,
};

/// Authenticated caller context supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub principal: Principal,
    pub roles: Vec<RoleId>,
}

impl Session {
    pub fn new<I, R>(principal: Principal, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleId>,
    {
        Self {
            principal,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Sorted, de-duplicated role set. Sessions holding the same roles share a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleSetKey(Vec<RoleId>);

impl RoleSetKey {
    pub fn new(roles: &[RoleId]) -> Self {
        let mut roles = roles.to_vec();
        roles.sort();
        roles.dedup();
        Self(roles)
    }

    pub fn roles(&self) -> &[RoleId] {
        &self.0
    }

    pub fn contains_any(&self, roles: &[RoleId]) -> bool {
        roles.iter().any(|role| self.0.binary_search(role).is_ok())
    }
}

/// One `(action, subject)` pair a protected operation declares.
///
/// ```rust
/// use gatekeeper::gate::Requirement;
/// use warden_authz::Action;
///
/// const REQUIRES: &[Requirement] = &[
///     Requirement::new(Action::Read, "Ticket"),
///     Requirement::new(Action::Update, "Ticket"),
/// ];
/// assert_eq!(REQUIRES.len(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub action: Action,
    pub subject: &'static str,
}

impl Requirement {
    pub const fn new(action: Action, subject: &'static str) -> Self {
        Self { action, subject }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Authorized,
    Denied(AuthzError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub decision: GateDecision,
    /// Empty whenever the decision is a denial.
    pub allowed_fields: FieldSet,
}

impl GateOutcome {
    fn denied(error: AuthzError) -> Self {
        Self {
            decision: GateDecision::Denied(error),
            allowed_fields: FieldSet::none(),
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self.decision, GateDecision::Authorized)
    }

    pub fn into_result(self) -> AuthzResult<FieldSet> {
        match self.decision {
            GateDecision::Authorized => Ok(self.allowed_fields),
            GateDecision::Denied(error) => Err(error),
        }
    }
}

pub struct EnforcementGate {
    catalog: Arc<dyn PermissionCatalog>,
    cache: DashMap<RoleSetKey, Arc<CompiledAbility>>,
    generation: AtomicU64,
    max_entries: usize,
}

impl EnforcementGate {
    /// `max_entries == 0` disables caching.
    pub fn new(catalog: Arc<dyn PermissionCatalog>, max_entries: usize) -> Self {
        Self {
            catalog,
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
            max_entries,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn PermissionCatalog> {
        &self.catalog
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Compiled ability for a role set, from cache or freshly built.
    pub async fn ability_for(&self, roles: &[RoleId]) -> CatalogResult<Arc<CompiledAbility>> {
        let key = RoleSetKey::new(roles);
        if let Some(entry) = self.cache.get(&key) {
            metrics::counter!("warden_ability_cache_total", "result" => "hit").increment(1);
            return Ok(entry.value().clone());
        }
        metrics::counter!("warden_ability_cache_total", "result" => "miss").increment(1);

        let generation = self.generation.load(Ordering::SeqCst);
        let definitions = self.catalog.fetch_roles(key.roles()).await?;
        let compilation = compile(&definitions);
        if !compilation.diagnostics.is_empty() {
            metrics::counter!("warden_rules_dropped_total")
                .increment(compilation.diagnostics.len() as u64);
        }
        let ability = Arc::new(compilation.ability);
        self.publish(key, &ability, generation);
        Ok(ability)
    }

    fn publish(&self, key: RoleSetKey, ability: &Arc<CompiledAbility>, generation: u64) {
        if self.max_entries == 0 || self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if self.cache.len() >= self.max_entries {
            self.cache.clear();
        }
        self.cache.insert(key.clone(), ability.clone());
        // An invalidation may have landed between the check above and the insert.
        if self.generation.load(Ordering::SeqCst) != generation {
            self.cache
                .remove_if(&key, |_, cached| Arc::ptr_eq(cached, ability));
        }
    }

    /// Drop cached abilities for every role set that includes one of `roles`.
    pub fn invalidate_roles(&self, roles: &[RoleId]) {
        if roles.is_empty() {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.retain(|key, _| !key.contains_any(roles));
        tracing::debug!(roles = roles.len(), "invalidated cached abilities");
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
        tracing::debug!("invalidated all cached abilities");
    }

    pub async fn evaluate(
        &self,
        session: Option<&Session>,
        action: Action,
        subject: &str,
        resource: Option<&Value>,
    ) -> GateOutcome {
        let Some(session) = session else {
            record_outcome("unauthenticated");
            return GateOutcome::denied(AuthzError::Unauthenticated);
        };
        match self.ability_for(&session.roles).await {
            Ok(ability) => decide(&ability, session, action, subject, resource),
            Err(err) => {
                tracing::error!(
                    principal = %session.principal.id,
                    backend = self.catalog.backend_name(),
                    error = %err,
                    "permission catalog unavailable; denying"
                );
                record_outcome("deny");
                GateOutcome::denied(AuthzError::forbidden(action, subject, None))
            }
        }
    }

    /// Like [`evaluate`](Self::evaluate), returning the allowed fields or the denial.
    pub async fn authorize(
        &self,
        session: Option<&Session>,
        action: Action,
        subject: &str,
        resource: Option<&Value>,
    ) -> AuthzResult<FieldSet> {
        self.evaluate(session, action, subject, resource)
            .await
            .into_result()
    }

    /// Check every requirement against one ability snapshot. Returns the intersection of the
    /// allowed field sets, or the first denial. An empty requirement list only requires a
    /// session.
    pub async fn enforce(
        &self,
        session: Option<&Session>,
        requirements: &[Requirement],
        resource: Option<&Value>,
    ) -> AuthzResult<FieldSet> {
        let Some(session) = session else {
            record_outcome("unauthenticated");
            return Err(AuthzError::Unauthenticated);
        };
        let Some(first) = requirements.first() else {
            return Ok(FieldSet::all());
        };
        let ability = match self.ability_for(&session.roles).await {
            Ok(ability) => ability,
            Err(err) => {
                tracing::error!(
                    principal = %session.principal.id,
                    backend = self.catalog.backend_name(),
                    error = %err,
                    "permission catalog unavailable; denying"
                );
                record_outcome("deny");
                return Err(AuthzError::forbidden(first.action, first.subject, None));
            }
        };

        let mut fields = FieldSet::all();
        for requirement in requirements {
            let allowed = decide(
                &ability,
                session,
                requirement.action,
                requirement.subject,
                resource,
            )
            .into_result()?;
            fields = fields.intersect(&allowed);
        }
        Ok(fields)
    }
}

fn decide(
    ability: &CompiledAbility,
    session: &Session,
    action: Action,
    subject: &str,
    resource: Option<&Value>,
) -> GateOutcome {
    let evaluation = ability.evaluate(&session.principal, action, subject, resource);
    let reason = evaluation.decision.reason().map(str::to_string);
    match evaluation.decision {
        Decision::Allow => {
            record_outcome("allow");
            GateOutcome {
                decision: GateDecision::Authorized,
                allowed_fields: evaluation.allowed_fields,
            }
        }
        Decision::Deny(denial) => {
            tracing::debug!(
                principal = %session.principal.id,
                %action,
                subject,
                denial = ?denial,
                reason = reason.as_deref().unwrap_or("-"),
                "authorization denied"
            );
            record_outcome("deny");
            GateOutcome::denied(AuthzError::forbidden(action, subject, reason))
        }
    }
}

fn record_outcome(outcome: &'static str) {
    metrics::counter!("warden_authz_decisions_total", "outcome" => outcome).increment(1);
}
