//! Strongly typed identifiers for roles and subjects.
//!
//! # Purpose
//! Wraps string identifiers so role ids and subject names cannot be swapped
//! by accident when threading them through the compiler and the gate.
//!
//! # How it fits
//! Role definitions carry a [`RoleId`]; permission rules and evaluator lookups
//! carry a [`SubjectName`].
//!
//! # Key invariants
//! - `as_str` and `Display` return the wrapped value unchanged.
//! - [`SubjectName::ALL`] is reserved: a rule on it applies to every subject.
//!
//! # Examples
//! ```rust
//! use warden_authz::{RoleId, SubjectName};
//!
//! let role = RoleId::new("member");
//! let subject = SubjectName::new("Team");
//! assert_eq!(format!("{role}:{subject}"), "member:Team");
//! ```
//!
//! # Common pitfalls
//! - Subject names are case sensitive; `user` and `User` are distinct subjects.
use serde::{Deserialize, Serialize};

/// Role identifier wrapper.
///
/// # Example
/// ```rust
/// use warden_authz::RoleId;
///
/// let role = RoleId::new("admin");
/// assert_eq!(role.as_str(), "admin");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    /// Construct a new role id wrapper.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Name of a protected domain entity type.
///
/// # Invariants
/// - The inner string is preserved exactly.
///
/// # Example
/// ```rust
/// use warden_authz::SubjectName;
///
/// assert!(SubjectName::new("all").is_all());
/// assert!(!SubjectName::new("User").is_all());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectName(String);

impl SubjectName {
    /// Wildcard subject matched by every lookup.
    pub const ALL: &'static str = "all";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_all(&self) -> bool {
        self.0 == Self::ALL
    }
}

impl std::fmt::Display for SubjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
