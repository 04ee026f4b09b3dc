//! Ability evaluation.
//!
//! # Purpose
//! Answers "may this principal perform this action on this subject (or this
//! resource instance)?" and "which fields may it touch?" from a compiled
//! ability. Evaluation is synchronous and side-effect free.
//!
//! # Key invariants
//! - Deny is the default: no candidate rule means [`Denial::NoRule`].
//! - Rules for one key are OR-ed; each is evaluated with its own condition.
//! - Without a resource, only rules whose condition has no comparisons can
//!   contribute.
//! - Allowed fields are the union over matching rules; any wildcard wins.
//!
//! # Examples
//! ```rust
//! use serde_json::json;
//! use warden_authz::{Ability, Action, Principal, RoleDefinition, RuleRecord, compile};
//!
//! let role = RoleDefinition::new(
//!     "member",
//!     "Member",
//!     vec![RuleRecord::new("update", "User")
//!         .with_conditions(json!({"id": "${principal.id}"}))
//!         .with_fields(["firstName", "lastName"])],
//! );
//! let ability = compile(&[role]).ability;
//! let principal = Principal::new("42");
//!
//! let own = json!({"id": "42"});
//! assert!(ability.can(&principal, Action::Update, "User", Some(&own)).is_allowed());
//! let other = json!({"id": "7"});
//! assert!(!ability.can(&principal, Action::Update, "User", Some(&other)).is_allowed());
//! ```
use crate::Action;
use crate::compiler::CompiledAbility;
use crate::fields::FieldSet;
use crate::interpolate::resolve;
use crate::principal::Principal;
use crate::rule::PermissionRule;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Nothing is granted for the `(subject, action)` key.
    NoRule,
    /// Candidate rules exist but none of their conditions held.
    ConditionsUnmet { reason: Option<String> },
    /// The action is allowed but the named field is outside the allowlist.
    FieldNotPermitted { field: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Diagnostic reason of the closest rule, if the denial carries one.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Deny(Denial::ConditionsUnmet { reason }) => reason.as_deref(),
            _ => None,
        }
    }
}

/// Decision plus the effective field allowlist, computed in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub allowed_fields: FieldSet,
}

pub trait Ability {
    fn evaluate(
        &self,
        principal: &Principal,
        action: Action,
        subject: &str,
        resource: Option<&Value>,
    ) -> Evaluation;

    fn can(
        &self,
        principal: &Principal,
        action: Action,
        subject: &str,
        resource: Option<&Value>,
    ) -> Decision {
        self.evaluate(principal, action, subject, resource).decision
    }

    fn allowed_fields(
        &self,
        principal: &Principal,
        action: Action,
        subject: &str,
        resource: Option<&Value>,
    ) -> FieldSet {
        self.evaluate(principal, action, subject, resource).allowed_fields
    }
}

impl Ability for CompiledAbility {
    fn evaluate(
        &self,
        principal: &Principal,
        action: Action,
        subject: &str,
        resource: Option<&Value>,
    ) -> Evaluation {
        let mut candidates = 0usize;
        let mut matched = false;
        let mut fields = FieldSet::none();
        let mut reason = None;

        for compiled in self.rules_for(subject, action) {
            candidates += 1;
            if rule_matches(&compiled.rule, principal, resource) {
                matched = true;
                fields.union_with(&compiled.rule.fields);
                if fields.is_all() {
                    break;
                }
            } else if reason.is_none() {
                reason = compiled.rule.reason.clone();
            }
        }

        let decision = if matched {
            Decision::Allow
        } else if candidates == 0 {
            Decision::Deny(Denial::NoRule)
        } else {
            Decision::Deny(Denial::ConditionsUnmet { reason })
        };
        Evaluation {
            decision,
            allowed_fields: fields,
        }
    }
}

fn rule_matches(rule: &PermissionRule, principal: &Principal, resource: Option<&Value>) -> bool {
    match (&rule.condition, resource) {
        (None, _) => true,
        (Some(condition), Some(resource)) => resolve(condition, principal).matches(resource),
        // Type-level check: a conditioned rule only counts if it cannot depend on the instance.
        (Some(condition), None) => !condition.depends_on_resource(),
    }
}

pub fn can<A: Ability + ?Sized>(
    ability: &A,
    principal: &Principal,
    action: Action,
    subject: &str,
    resource: Option<&Value>,
) -> Decision {
    ability.can(principal, action, subject, resource)
}

pub fn allowed_fields<A: Ability + ?Sized>(
    ability: &A,
    principal: &Principal,
    action: Action,
    subject: &str,
    resource: Option<&Value>,
) -> FieldSet {
    ability.allowed_fields(principal, action, subject, resource)
}

/// Field-scoped check: allowed iff the action is allowed and `field` is in
/// the effective allowlist.
pub fn can_field<A: Ability + ?Sized>(
    ability: &A,
    principal: &Principal,
    action: Action,
    subject: &str,
    resource: Option<&Value>,
    field: &str,
) -> Decision {
    let evaluation = ability.evaluate(principal, action, subject, resource);
    match evaluation.decision {
        Decision::Allow if evaluation.allowed_fields.contains(field) => Decision::Allow,
        Decision::Allow => Decision::Deny(Denial::FieldNotPermitted {
            field: field.to_string(),
        }),
        denied => denied,
    }
}
