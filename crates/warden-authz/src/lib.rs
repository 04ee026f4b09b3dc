//! Warden attribute-based authorization engine.
//!
//! # Purpose
//! Decides whether a principal may perform an action on a subject, and which
//! fields it may touch, from role-attached rules with principal-relative
//! conditions. Also derives the content-addressed identity used to keep rule
//! catalogs idempotent across synchronization runs.
//!
//! # How it fits
//! Catalog backends and manifests supply [`RoleDefinition`]s. [`compile`]
//! turns the roles a principal holds into a [`CompiledAbility`], which the
//! enforcement gate caches and evaluates per request through [`Ability`].
//!
//! # Key invariants
//! - Rules only grant. Absence of a matching rule is denial.
//! - `manage` is expanded at compile time into create/read/update/delete.
//! - Malformed rules are dropped at compile time and never grant anything.
//! - Missing principal attributes make a condition fail, never error.
//!
//! # Examples
//! ```rust
//! use warden_authz::{Ability, Action, Principal, RoleDefinition, RuleRecord, compile};
//!
//! let admin = RoleDefinition::new("admin", "Administrator", vec![RuleRecord::new("manage", "Team")]);
//! let ability = compile(&[admin]).ability;
//! let principal = Principal::new("1");
//! assert!(ability.can(&principal, Action::Delete, "Team", None).is_allowed());
//! assert!(!ability.can(&principal, Action::Read, "User", None).is_allowed());
//! ```
//!
//! # Common pitfalls
//! - Checking an ownership rule without passing the resource always denies;
//!   load the instance first when the rule depends on it.
//! - Treating an allowed decision as permission to write every field; consult
//!   the allowed field set for mutations.

mod action;
mod compiler;
pub mod condition;
mod errors;
mod evaluator;
mod fields;
mod identity;
pub mod interpolate;
mod principal;
mod rule;
mod types;

pub use action::Action;
pub use compiler::{Compilation, CompiledAbility, CompiledRule, Diagnostic, RuleRef, compile};
pub use condition::ConditionExpr;
pub use errors::{AuthzError, AuthzResult};
pub use evaluator::{Ability, Decision, Denial, Evaluation, allowed_fields, can, can_field};
pub use fields::FieldSet;
pub use identity::PermissionIdentity;
pub use interpolate::{ResolvedCondition, resolve};
pub use principal::Principal;
pub use rule::{PermissionRule, RoleDefinition, RuleRecord};
pub use types::{RoleId, SubjectName};
