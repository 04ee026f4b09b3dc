//! Content-addressed permission identity.
//!
//! # Purpose
//! Derives a stable key for a rule from its action, subject, condition shape
//! and field set, so catalog synchronization can upsert instead of duplicating.
//!
//! # Key invariants
//! - Map key order, field order and duplicate field names never change a hash.
//! - A parseable condition hashes its normalized comparisons, so `{"a": {"b": 1}}`,
//!   `{"a.b": 1}` and `{"a.b": {"$eq": 1}}` share an identity.
//! - "All fields", the empty field list and every other list hash differently.
//! - An absent condition and the empty condition `{}` hash differently.
//! - A condition that does not parse is tagged apart from every parsed one, so
//!   a malformed record can never share an identity with a valid rule.
//! - Integral floats hash as integers (`1.0` is `1`). Strings stay distinct
//!   from numbers even where evaluation coerces them.
//!
//! # Security considerations
//! - Digests are SHA-256 with a domain prefix per component, so a condition
//!   digest can never be mistaken for a fields digest.
use crate::condition::ConditionExpr;
use crate::fields::FieldSet;
use crate::rule::{PermissionRule, RuleRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

const CONDITION_DOMAIN: &[u8] = b"warden.condition.v1";
const FIELDS_DOMAIN: &[u8] = b"warden.fields.v1";
const ABSENT_TOKEN: &[u8] = b"<none>";
const PARSED_TAG: &[u8] = b"ast|";
const RAW_TAG: &[u8] = b"raw|";
const WILDCARD_TOKEN: &[u8] = b"<all>";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionIdentity {
    pub action: String,
    pub subject: String,
    pub condition_hash: String,
    pub fields_hash: String,
}

impl PermissionIdentity {
    pub fn of_rule(rule: &PermissionRule) -> Self {
        Self {
            action: rule.action.as_str().to_string(),
            subject: rule.subject.as_str().to_string(),
            condition_hash: condition_hash(
                rule.condition
                    .as_ref()
                    .map(|expr| CanonicalCondition::Parsed(canonical_condition(expr))),
            ),
            fields_hash: fields_hash(&declared_fields(&rule.fields)),
        }
    }

    /// Identity of a raw record. Records whose condition does not parse still
    /// get a stable identity from their key-sorted JSON.
    pub fn of_record(record: &RuleRecord) -> Self {
        let condition = record.condition_value().map(|value| match ConditionExpr::parse(value) {
            Ok(expr) => CanonicalCondition::Parsed(canonical_condition(&expr)),
            Err(_) => CanonicalCondition::Raw(value.clone()),
        });
        let fields = record.fields.as_ref().map(|fields| {
            fields
                .iter()
                .map(|field| field.trim().to_string())
                .collect::<BTreeSet<_>>()
        });
        Self {
            action: record.action.trim().to_ascii_lowercase(),
            subject: record.subject.trim().to_string(),
            condition_hash: condition_hash(condition),
            fields_hash: fields_hash(&fields),
        }
    }

    /// Single-string form, `action:subject:condition_hash:fields_hash`.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.action, self.subject, self.condition_hash, self.fields_hash
        )
    }
}

impl std::fmt::Display for PermissionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short hashes keep log lines readable; `key()` is the durable form.
        write!(
            f,
            "{}:{}:{}:{}",
            self.action,
            self.subject,
            short_hash(&self.condition_hash),
            short_hash(&self.fields_hash)
        )
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

enum CanonicalCondition {
    Parsed(Value),
    /// Key-sorted JSON of a condition that failed to parse.
    Raw(Value),
}

fn declared_fields(fields: &FieldSet) -> Option<BTreeSet<String>> {
    match fields {
        FieldSet::All => None,
        FieldSet::Only(fields) => Some(fields.clone()),
    }
}

/// Normalized comparisons as a sorted, de-duplicated `[[path, op, operand], ...]`.
fn canonical_condition(expr: &ConditionExpr) -> Value {
    let mut entries: Vec<(String, Value)> = expr
        .comparisons()
        .into_iter()
        .map(|comparison| {
            let entry = Value::Array(vec![
                Value::String(comparison.path.to_string()),
                Value::String(comparison.op.as_str().to_string()),
                normalize_numbers(comparison.operand.source_value()),
            ]);
            let mut sort_key = String::new();
            write_canonical(&entry, &mut sort_key);
            (sort_key, entry)
        })
        .collect();
    entries.sort_by(|left, right| left.0.cmp(&right.0));
    entries.dedup_by(|left, right| left.0 == right.0);
    Value::Array(entries.into_iter().map(|(_, entry)| entry).collect())
}

/// Rewrites floats with an exact integer value as integers, at every depth.
fn normalize_numbers(value: Value) -> Value {
    match value {
        Value::Number(number) if !number.is_i64() && !number.is_u64() => {
            let Some(float) = number.as_f64() else {
                return Value::Number(number);
            };
            if float.fract() != 0.0 {
                Value::Number(number)
            } else if float >= i64::MIN as f64 && float < i64::MAX as f64 {
                Value::from(float as i64)
            } else if float >= 0.0 && float < u64::MAX as f64 {
                Value::from(float as u64)
            } else {
                Value::Number(number)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, normalize_numbers(value)))
                .collect(),
        ),
        other => other,
    }
}

fn condition_hash(condition: Option<CanonicalCondition>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(CONDITION_DOMAIN);
    hasher.update(b"|");
    let (tag, value) = match &condition {
        None => {
            hasher.update(ABSENT_TOKEN);
            return hex::encode(hasher.finalize());
        }
        Some(CanonicalCondition::Parsed(value)) => (PARSED_TAG, value),
        Some(CanonicalCondition::Raw(value)) => (RAW_TAG, value),
    };
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    hasher.update(tag);
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn fields_hash(fields: &Option<BTreeSet<String>>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FIELDS_DOMAIN);
    hasher.update(b"|");
    match fields {
        None => hasher.update(WILDCARD_TOKEN),
        Some(fields) => {
            hasher.update(b"list");
            // Length-prefix each name so ["ab"] and ["a", "b"] differ.
            for field in fields {
                hasher.update((field.len() as u64).to_le_bytes());
                hasher.update(field.as_bytes());
            }
        }
    }
    hex::encode(hasher.finalize())
}

/// Serialize JSON with object keys sorted at every depth.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(conditions: Option<Value>, fields: Option<Vec<&str>>) -> RuleRecord {
        let mut record = RuleRecord::new("update", "User");
        record.conditions = conditions;
        record.fields = fields.map(|fields| fields.into_iter().map(str::to_string).collect());
        record
    }

    #[test]
    fn key_and_field_order_do_not_matter() {
        let a = record(
            Some(json!({"id": "${principal.id}", "status": {"$ne": "closed"}})),
            Some(vec!["firstName", "lastName"]),
        );
        let b = record(
            Some(json!({"status": {"$ne": "closed"}, "id": "${principal.id}"})),
            Some(vec!["lastName", "firstName", "lastName"]),
        );
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn equivalent_condition_encodings_share_identity() {
        let nested = record(Some(json!({"team": {"id": 1}})), None);
        let dotted = record(Some(json!({"team.id": 1})), None);
        let explicit = record(Some(json!({"team.id": {"$eq": 1}})), None);
        assert_eq!(nested.identity(), dotted.identity());
        assert_eq!(dotted.identity(), explicit.identity());
    }

    #[test]
    fn typed_and_record_identities_agree() {
        let raw = record(
            Some(json!({"id": "${principal.id}"})),
            Some(vec!["lastName", "firstName"]),
        );
        let rule = PermissionRule::from_record(&raw).expect("rule");
        assert_eq!(rule.identity(), raw.identity());
    }

    #[test]
    fn wildcard_and_empty_fields_differ() {
        let all = record(None, None).identity();
        let empty = record(None, Some(vec![])).identity();
        let one = record(None, Some(vec!["firstName"])).identity();
        assert_ne!(all.fields_hash, empty.fields_hash);
        assert_ne!(all.fields_hash, one.fields_hash);
        assert_ne!(empty.fields_hash, one.fields_hash);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let joined = record(None, Some(vec!["ab"])).identity();
        let split = record(None, Some(vec!["a", "b"])).identity();
        assert_ne!(joined.fields_hash, split.fields_hash);
    }

    #[test]
    fn absent_and_empty_conditions_differ() {
        let absent = record(None, None).identity();
        let null = record(Some(Value::Null), None).identity();
        let empty = record(Some(json!({})), None).identity();
        assert_eq!(absent, null);
        assert_ne!(absent.condition_hash, empty.condition_hash);
    }

    #[test]
    fn action_and_subject_are_part_of_identity() {
        let update = record(None, None).identity();
        let mut read = record(None, None);
        read.action = "Read".to_string();
        assert_ne!(update, read.identity());
        assert_eq!(read.identity().action, "read");
    }

    #[test]
    fn malformed_conditions_still_hash_stably() {
        let a = record(Some(json!({"id": {"$in": [1, 2]}, "b": 1})), None);
        let b = record(Some(json!({"b": 1, "id": {"$in": [1, 2]}})), None);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let mut out = String::new();
        write_canonical(&json!({"b": {"d": 1, "c": [true, null]}, "a": "x"}), &mut out);
        assert_eq!(out, r#"{"a":"x","b":{"c":[true,null],"d":1}}"#);
    }

    #[test]
    fn key_renders_all_components() {
        let identity = record(None, None).identity();
        let key = identity.key();
        assert!(key.starts_with("update:User:"));
        assert_eq!(key.split(':').count(), 4);
        assert_eq!(identity.condition_hash.len(), 64);
    }

    #[test]
    fn malformed_conditions_never_collide_with_parsed_ones() {
        let empty_list = record(Some(json!([])), None).identity();
        let empty_object = record(Some(json!({})), None).identity();
        assert_ne!(empty_list, empty_object);

        let triples = record(Some(json!([["id", "$eq", "${principal.id}"]])), None).identity();
        let object = record(Some(json!({"id": "${principal.id}"})), None).identity();
        assert_ne!(triples, object);
    }

    #[test]
    fn integral_floats_hash_as_integers() {
        let int = record(Some(json!({"level": 1})), None).identity();
        let float = record(Some(json!({"level": 1.0})), None).identity();
        let half = record(Some(json!({"level": 1.5})), None).identity();
        assert_eq!(int, float);
        assert_ne!(int, half);

        let text = record(Some(json!({"level": "1"})), None).identity();
        assert_ne!(int, text);
    }

    #[test]
    fn display_tolerates_non_hex_hashes() {
        let mut identity = record(None, None).identity();
        identity.condition_hash = "aéééééééé".to_string();
        identity.fields_hash = "ab".to_string();
        let rendered = identity.to_string();
        assert!(rendered.ends_with(":ab"));

        let short = record(None, None).identity().to_string();
        assert_eq!(short.split(':').nth(2).map(str::len), Some(12));
    }
}
