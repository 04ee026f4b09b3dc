//! Permission rules and role definitions.
//!
//! # Purpose
//! Defines the raw rule record stored in catalogs and manifests, and the typed
//! rule the compiler derives from it.
//!
//! # How it fits
//! Catalogs and manifests hand [`RuleRecord`]s to the compiler, which parses
//! them into [`PermissionRule`]s. Records stay loosely typed so a bad action or
//! condition is reported per rule instead of failing a whole document.
//!
//! # Key invariants
//! - A rule is an allow grant; there is no deny rule.
//! - `fields: None` on a record means every field.
//!
//! # Examples
//! ```rust
//! use warden_authz::{Action, PermissionRule, RuleRecord};
//!
//! let record = RuleRecord::new("update", "User")
//!     .with_conditions(serde_json::json!({"id": "${principal.id}"}))
//!     .with_fields(["firstName", "lastName"]);
//! let rule = PermissionRule::from_record(&record).expect("valid rule");
//! assert_eq!(rule.action, Action::Update);
//! assert!(rule.fields.contains("firstName"));
//! ```
//!
//! # Common pitfalls
//! - An empty `fields` list grants no fields at all; omit it to grant every field.
use crate::condition::ConditionExpr;
use crate::fields::FieldSet;
use crate::identity::PermissionIdentity;
use crate::{Action, AuthzError, AuthzResult, RoleId, SubjectName};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rule as stored in a catalog or declared in a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub action: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RuleRecord {
    pub fn new(action: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            subject: subject.into(),
            conditions: None,
            fields: None,
            reason: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Value) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Condition blob, treating an explicit JSON `null` as absent.
    pub fn condition_value(&self) -> Option<&Value> {
        self.conditions.as_ref().filter(|value| !value.is_null())
    }

    pub fn identity(&self) -> PermissionIdentity {
        PermissionIdentity::of_record(self)
    }
}

/// Parsed, validated grant.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionRule {
    pub action: Action,
    pub subject: SubjectName,
    pub condition: Option<ConditionExpr>,
    pub fields: FieldSet,
    pub reason: Option<String>,
}

impl PermissionRule {
    /// Parse a record.
    ///
    /// # Errors
    /// - [`AuthzError::InvalidAction`] for an unknown action string.
    /// - [`AuthzError::MalformedRule`] for an empty subject, an unsupported
    ///   condition shape, or an empty field name.
    pub fn from_record(record: &RuleRecord) -> AuthzResult<Self> {
        let action: Action = record.action.parse()?;
        let subject = record.subject.trim();
        if subject.is_empty() {
            return Err(AuthzError::malformed("subject must not be empty"));
        }
        let condition = record
            .condition_value()
            .map(ConditionExpr::parse)
            .transpose()?;
        let empty_field = record
            .fields
            .iter()
            .flatten()
            .any(|field| field.trim().is_empty());
        if empty_field {
            return Err(AuthzError::malformed("field names must not be empty"));
        }
        Ok(Self {
            action,
            subject: SubjectName::new(subject),
            condition,
            fields: FieldSet::from_declared(record.fields.as_deref()),
            reason: record.reason.clone(),
        })
    }

    pub fn identity(&self) -> PermissionIdentity {
        PermissionIdentity::of_rule(self)
    }
}

/// A named bundle of rules assigned to principals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
}

impl RoleDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, rules: Vec<RuleRecord>) -> Self {
        Self {
            id: RoleId::new(id),
            name: name.into(),
            rules,
        }
    }
}
