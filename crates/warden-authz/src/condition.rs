//! Rule condition AST and its parser.
//!
//! # Purpose
//! Turns the JSON condition blob stored with a rule into a closed, typed
//! expression so unsupported shapes are rejected when rules are compiled.
//!
//! # How it fits
//! The compiler parses every rule condition once; the interpolator resolves
//! parsed conditions per request against the calling principal.
//!
//! # Grammar
//! - `{"attr": v}` compares `attr` for equality with `v`.
//! - `{"attr": {"$eq": v}}` and `{"attr": {"$ne": v}}` are the explicit forms.
//! - `{"attr": {"nested": v}}` descends into the resource graph.
//! - Keys may be dotted paths (`"members.id"`).
//! - Every key of an object is a conjunct.
//! - String operands may embed `${principal.<path>}` placeholders.
//!
//! # Key invariants
//! - Operands are scalars (string, number, bool, null); arrays and objects in
//!   operand position are malformed.
//! - Only `$eq` and `$ne` are recognised; other `$` keys are malformed.
use crate::principal::Principal;
use crate::{AuthzError, AuthzResult};
use serde_json::{Map, Value};

const PLACEHOLDER_OPEN: &str = "${";
const PLACEHOLDER_CLOSE: char = '}';
const PRINCIPAL_ROOT: &str = "principal.";

/// Dotted attribute path, e.g. `members.id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath(Vec<String>);

impl AttributePath {
    pub fn parse(raw: &str) -> AuthzResult<Self> {
        let mut segments = Vec::new();
        for segment in raw.split('.') {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(AuthzError::malformed(format!(
                    "empty segment in attribute path {raw:?}"
                )));
            }
            segments.push(segment.to_string());
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    fn joined(&self, child: &AttributePath) -> Self {
        let mut segments = self.0.clone();
        segments.extend(child.0.iter().cloned());
        Self(segments)
    }

    /// Every value reached by walking the path through `root`.
    ///
    /// Arrays met along the way fan out over their elements, and an array at
    /// the end of the path contributes its elements.
    pub fn collect<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut out = Vec::new();
        collect_into(root, &self.0, &mut out);
        out
    }
}

fn collect_into<'a>(value: &'a Value, segments: &[String], out: &mut Vec<&'a Value>) {
    match (value, segments) {
        (Value::Array(items), _) => {
            for item in items {
                collect_into(item, segments, out);
            }
        }
        (value, []) => out.push(value),
        (Value::Object(map), [head, tail @ ..]) => {
            if let Some(next) = map.get(head) {
                collect_into(next, tail, out);
            }
        }
        _ => {}
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Eq,
    Ne,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Eq => "$eq",
            Comparator::Ne => "$ne",
        }
    }

    fn parse(raw: &str) -> AuthzResult<Self> {
        match raw {
            "$eq" => Ok(Comparator::Eq),
            "$ne" => Ok(Comparator::Ne),
            other => Err(AuthzError::malformed(format!(
                "unsupported condition operator {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Text(String),
    Principal(AttributePath),
}

/// String operand containing one or more `${principal.<path>}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<TemplatePart>,
}

impl Template {
    pub fn parse(source: &str) -> AuthzResult<Self> {
        let mut parts = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
            if start > 0 {
                parts.push(TemplatePart::Text(rest[..start].to_string()));
            }
            let after = &rest[start + PLACEHOLDER_OPEN.len()..];
            let end = after.find(PLACEHOLDER_CLOSE).ok_or_else(|| {
                AuthzError::malformed(format!("unterminated placeholder in {source:?}"))
            })?;
            let expr = after[..end].trim();
            let path = expr.strip_prefix(PRINCIPAL_ROOT).ok_or_else(|| {
                AuthzError::malformed(format!(
                    "placeholder {expr:?} must reference principal attributes"
                ))
            })?;
            parts.push(TemplatePart::Principal(AttributePath::parse(path)?));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Text(rest.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitute principal attributes.
    ///
    /// A template that is exactly one placeholder keeps the attribute's JSON
    /// type. Mixed templates render to a string, which requires every
    /// referenced attribute to be a scalar. Returns `None` when any
    /// referenced attribute is missing.
    pub fn resolve(&self, principal: &Principal) -> Option<Value> {
        if let [TemplatePart::Principal(path)] = self.parts.as_slice() {
            return principal.lookup(path);
        }
        let mut rendered = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Text(text) => rendered.push_str(text),
                TemplatePart::Principal(path) => {
                    rendered.push_str(&scalar_string(&principal.lookup(path)?)?);
                }
            }
        }
        Some(Value::String(rendered))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Template(Template),
}

impl Operand {
    fn parse(value: &Value) -> AuthzResult<Self> {
        match value {
            Value::String(text) if text.contains(PLACEHOLDER_OPEN) => {
                Ok(Operand::Template(Template::parse(text)?))
            }
            Value::Array(_) | Value::Object(_) => Err(AuthzError::malformed(
                "condition operands must be scalars",
            )),
            scalar => Ok(Operand::Literal(scalar.clone())),
        }
    }

    /// The operand as it is written in a rule.
    pub fn source_value(&self) -> Value {
        match self {
            Operand::Literal(value) => value.clone(),
            Operand::Template(template) => Value::String(template.source().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub path: AttributePath,
    pub op: Comparator,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    All(Vec<ConditionExpr>),
    Compare(Comparison),
}

impl ConditionExpr {
    pub fn parse(value: &Value) -> AuthzResult<Self> {
        match value {
            Value::Object(map) => Ok(ConditionExpr::All(parse_object(None, map)?)),
            _ => Err(AuthzError::malformed("condition must be an object")),
        }
    }

    /// False only for conditions with no comparisons at all.
    pub fn depends_on_resource(&self) -> bool {
        match self {
            ConditionExpr::All(children) => children.iter().any(Self::depends_on_resource),
            ConditionExpr::Compare(_) => true,
        }
    }

    /// Flattened comparisons in evaluation order.
    pub fn comparisons(&self) -> Vec<&Comparison> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a Comparison>) {
        match self {
            ConditionExpr::All(children) => {
                for child in children {
                    child.flatten_into(out);
                }
            }
            ConditionExpr::Compare(comparison) => out.push(comparison),
        }
    }
}

fn parse_object(
    prefix: Option<&AttributePath>,
    map: &Map<String, Value>,
) -> AuthzResult<Vec<ConditionExpr>> {
    let mut out = Vec::with_capacity(map.len());
    for (key, value) in map {
        if key.starts_with('$') {
            return Err(AuthzError::malformed(format!(
                "operator {key:?} must be applied to an attribute"
            )));
        }
        let relative = AttributePath::parse(key)?;
        let path = match prefix {
            Some(prefix) => prefix.joined(&relative),
            None => relative,
        };
        match value {
            Value::Object(inner) if inner.keys().any(|k| k.starts_with('$')) => {
                for (op, operand) in inner {
                    if !op.starts_with('$') {
                        return Err(AuthzError::malformed(format!(
                            "cannot mix operators and nested attributes under {path}"
                        )));
                    }
                    out.push(ConditionExpr::Compare(Comparison {
                        path: path.clone(),
                        op: Comparator::parse(op)?,
                        operand: Operand::parse(operand)?,
                    }));
                }
            }
            Value::Object(inner) => {
                if inner.is_empty() {
                    return Err(AuthzError::malformed(format!(
                        "empty nested condition under {path}"
                    )));
                }
                out.push(ConditionExpr::All(parse_object(Some(&path), inner)?));
            }
            operand => out.push(ConditionExpr::Compare(Comparison {
                path,
                op: Comparator::Eq,
                operand: Operand::parse(operand)?,
            })),
        }
    }
    Ok(out)
}

/// String form of a scalar, used for coercing comparisons and rendering templates.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> AuthzResult<ConditionExpr> {
        ConditionExpr::parse(&value)
    }

    #[test]
    fn shorthand_equality_parses() {
        let expr = parse(json!({"id": "${principal.id}"})).expect("condition");
        let comparisons = expr.comparisons();
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].path.to_string(), "id");
        assert_eq!(comparisons[0].op, Comparator::Eq);
        assert!(matches!(comparisons[0].operand, Operand::Template(_)));
    }

    #[test]
    fn explicit_operators_parse() {
        let expr = parse(json!({"status": {"$ne": "closed", "$eq": "open"}})).expect("condition");
        let ops: Vec<_> = expr.comparisons().iter().map(|c| c.op).collect();
        assert!(ops.contains(&Comparator::Eq));
        assert!(ops.contains(&Comparator::Ne));
    }

    #[test]
    fn nested_objects_become_paths() {
        let nested = parse(json!({"team": {"owner": {"id": 1}}})).expect("nested");
        let dotted = parse(json!({"team.owner.id": 1})).expect("dotted");
        assert_eq!(nested.comparisons()[0].path, dotted.comparisons()[0].path);
        assert_eq!(nested.comparisons()[0].path.to_string(), "team.owner.id");
    }

    #[test]
    fn unknown_operator_is_malformed() {
        let err = parse(json!({"id": {"$in": ["1"]}})).expect_err("unknown operator");
        assert!(matches!(err, AuthzError::MalformedRule(_)));
        let err = parse(json!({"$or": [{"id": 1}]})).expect_err("top-level operator");
        assert!(matches!(err, AuthzError::MalformedRule(_)));
    }

    #[test]
    fn non_scalar_operands_are_malformed() {
        assert!(parse(json!({"id": [1, 2]})).is_err());
        assert!(parse(json!({"id": {"$eq": {"x": 1}}})).is_err());
        assert!(parse(json!({"id": {"$eq": 1, "name": "x"}})).is_err());
        assert!(parse(json!({"team": {}})).is_err());
        assert!(parse(json!("id")).is_err());
    }

    #[test]
    fn template_roots_are_validated() {
        assert!(parse(json!({"id": "${user.id}"})).is_err());
        assert!(parse(json!({"id": "${principal.id"})).is_err());
        assert!(parse(json!({"id": "${principal.}"})).is_err());
    }

    #[test]
    fn empty_condition_does_not_depend_on_resource() {
        let expr = parse(json!({})).expect("empty");
        assert!(!expr.depends_on_resource());
        let expr = parse(json!({"id": 1})).expect("condition");
        assert!(expr.depends_on_resource());
    }

    #[test]
    fn template_resolution_keeps_type_or_renders() {
        let principal = Principal::new("42").with_attribute("level", json!(3));
        let whole = Template::parse("${principal.level}").expect("template");
        assert_eq!(whole.resolve(&principal), Some(json!(3)));

        let mixed = Template::parse("user-${principal.id}-l${principal.level}").expect("template");
        assert_eq!(mixed.resolve(&principal), Some(json!("user-42-l3")));

        let missing = Template::parse("x-${principal.team}").expect("template");
        assert_eq!(missing.resolve(&principal), None);
    }

    #[test]
    fn collect_fans_out_over_collections() {
        let resource = json!({
            "members": [{"id": "1"}, {"id": "2"}, {"name": "no id"}],
            "tags": ["a", "b"],
        });
        let ids = AttributePath::parse("members.id").expect("path").collect(&resource);
        assert_eq!(ids, vec![&json!("1"), &json!("2")]);
        let tags = AttributePath::parse("tags").expect("path").collect(&resource);
        assert_eq!(tags.len(), 2);
        let missing = AttributePath::parse("owner.id").expect("path").collect(&resource);
        assert!(missing.is_empty());
    }
}
