//! Rule compilation into an immutable `(subject, action)` index.
//!
//! # Purpose and responsibility
//! Unions the rules of every role a principal holds, expands `manage` into
//! the concrete actions, and groups rules by the key the evaluator looks up.
//!
//! # Where it fits
//! The enforcement gate compiles once per role set and caches the resulting
//! [`CompiledAbility`] behind an `Arc`; evaluation never mutates it.
//!
//! # Key invariants and assumptions
//! - Grants are additive. Compiling more roles never removes a grant.
//! - Rules keep their own condition and field set; nothing is merged.
//! - A malformed rule is dropped with a [`Diagnostic`]; the rest still compile.
//!
//! # Security considerations
//! - Dropping is the fail-closed direction: a rule that cannot be understood
//!   grants nothing.
use crate::rule::{PermissionRule, RoleDefinition};
use crate::{Action, AuthzError, RoleId, SubjectName};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A parsed rule plus the role it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub role_id: RoleId,
    pub rule: PermissionRule,
}

pub type RuleRef = Arc<CompiledRule>;

#[derive(Debug, Clone, Default)]
pub struct CompiledAbility {
    index: HashMap<(SubjectName, Action), Vec<RuleRef>>,
    rule_count: usize,
}

impl CompiledAbility {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Candidate rules for a lookup: rules on `subject` first, then rules on
    /// the `all` wildcard subject.
    pub fn rules_for<'a>(
        &'a self,
        subject: &str,
        action: Action,
    ) -> impl Iterator<Item = &'a CompiledRule> + 'a {
        let exact = self.index.get(&(SubjectName::new(subject), action));
        let wildcard = if subject == SubjectName::ALL {
            None
        } else {
            self.index.get(&(SubjectName::new(SubjectName::ALL), action))
        };
        exact
            .into_iter()
            .chain(wildcard)
            .flatten()
            .map(|rule| &**rule)
    }

    /// Number of source rules compiled (before `manage` expansion).
    pub fn len(&self) -> usize {
        self.rule_count
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count == 0
    }

    pub fn subjects(&self) -> BTreeSet<&SubjectName> {
        self.index.keys().map(|(subject, _)| subject).collect()
    }
}

/// A rule the compiler dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub role_id: RoleId,
    /// Position of the rule within its role.
    pub position: usize,
    pub error: AuthzError,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "role {} rule #{}: {}",
            self.role_id, self.position, self.error
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Compilation {
    pub ability: CompiledAbility,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile the union of `roles` into an ability.
///
/// # Example
/// ```rust
/// use warden_authz::{Action, RoleDefinition, RuleRecord, compile};
///
/// let role = RoleDefinition::new(
///     "lead",
///     "Team lead",
///     vec![RuleRecord::new("manage", "Team"), RuleRecord::new("fly", "Team")],
/// );
/// let compiled = compile(&[role]);
/// assert_eq!(compiled.diagnostics.len(), 1);
/// assert_eq!(compiled.ability.rules_for("Team", Action::Delete).count(), 1);
/// ```
pub fn compile(roles: &[RoleDefinition]) -> Compilation {
    let mut index: HashMap<(SubjectName, Action), Vec<RuleRef>> = HashMap::new();
    let mut diagnostics = Vec::new();
    let mut rule_count = 0;

    for role in roles {
        for (position, record) in role.rules.iter().enumerate() {
            let rule = match PermissionRule::from_record(record) {
                Ok(rule) => rule,
                Err(error) => {
                    tracing::warn!(
                        role = %role.id,
                        position,
                        action = %record.action,
                        subject = %record.subject,
                        error = %error,
                        "dropping malformed permission rule"
                    );
                    diagnostics.push(Diagnostic {
                        role_id: role.id.clone(),
                        position,
                        error,
                    });
                    continue;
                }
            };
            rule_count += 1;
            let compiled = Arc::new(CompiledRule {
                role_id: role.id.clone(),
                rule,
            });
            for action in compiled.rule.action.implied() {
                index
                    .entry((compiled.rule.subject.clone(), *action))
                    .or_default()
                    .push(compiled.clone());
            }
        }
    }

    Compilation {
        ability: CompiledAbility { index, rule_count },
        diagnostics,
    }
}
