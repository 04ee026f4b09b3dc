//! Field allowlists attached to rules and produced by evaluation.
//!
//! # Purpose
//! Models "all fields" versus an explicit set of field names, and the set
//! algebra the evaluator and the enforcement boundary need.
//!
//! # Key invariants
//! - `FieldSet::All` absorbs every union.
//! - The empty explicit set means "nothing permitted" and is distinct from `All`.
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSet {
    All,
    Only(BTreeSet<String>),
}

impl FieldSet {
    pub fn all() -> Self {
        FieldSet::All
    }

    /// The empty allowlist.
    pub fn none() -> Self {
        FieldSet::Only(BTreeSet::new())
    }

    pub fn only<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSet::Only(fields.into_iter().map(Into::into).collect())
    }

    /// Build from the optional list stored on a rule record; `None` is the wildcard.
    pub fn from_declared(fields: Option<&[String]>) -> Self {
        match fields {
            None => FieldSet::All,
            Some(fields) => FieldSet::only(fields.iter().map(|field| field.trim().to_string())),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FieldSet::All)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldSet::All => false,
            FieldSet::Only(fields) => fields.is_empty(),
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        match self {
            FieldSet::All => true,
            FieldSet::Only(fields) => fields.contains(field),
        }
    }

    pub fn union_with(&mut self, other: &FieldSet) {
        match (&mut *self, other) {
            (FieldSet::All, _) => {}
            (_, FieldSet::All) => *self = FieldSet::All,
            (FieldSet::Only(mine), FieldSet::Only(theirs)) => {
                mine.extend(theirs.iter().cloned());
            }
        }
    }

    pub fn union(mut self, other: &FieldSet) -> Self {
        self.union_with(other);
        self
    }

    /// Fields permitted by both sets. Used when several requirements guard one call.
    pub fn intersect(&self, other: &FieldSet) -> FieldSet {
        match (self, other) {
            (FieldSet::All, other) | (other, FieldSet::All) => other.clone(),
            (FieldSet::Only(left), FieldSet::Only(right)) => {
                FieldSet::Only(left.intersection(right).cloned().collect())
            }
        }
    }

    /// Requested field names that fall outside this set, in request order.
    pub fn disallowed<'a, I>(&self, requested: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        requested
            .into_iter()
            .filter(|field| !self.contains(field))
            .map(str::to_string)
            .collect()
    }

    /// Project a JSON object onto the permitted keys. Non-objects are returned as-is
    /// when every field is allowed and replaced by an empty object otherwise.
    pub fn filter_object(&self, value: &Value) -> Value {
        match (self, value) {
            (FieldSet::All, value) => value.clone(),
            (FieldSet::Only(fields), Value::Object(map)) => {
                let filtered: Map<String, Value> = map
                    .iter()
                    .filter(|(key, _)| fields.contains(key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Value::Object(filtered)
            }
            (FieldSet::Only(_), _) => Value::Object(Map::new()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let fields = match self {
            FieldSet::All => None,
            FieldSet::Only(fields) => Some(fields.iter().map(String::as_str)),
        };
        fields.into_iter().flatten()
    }
}

impl std::fmt::Display for FieldSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldSet::All => f.write_str("*"),
            FieldSet::Only(fields) => {
                let joined = fields.iter().cloned().collect::<Vec<_>>().join(",");
                write!(f, "[{joined}]")
            }
        }
    }
}
