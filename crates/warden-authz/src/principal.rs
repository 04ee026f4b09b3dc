//! The authenticated caller as seen by the engine.
use crate::condition::AttributePath;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Look up `principal.<path>`.
    ///
    /// `id` addresses the principal id; every other path walks `attributes`.
    /// Arrays may be indexed with numeric segments.
    pub fn lookup(&self, path: &AttributePath) -> Option<Value> {
        let segments = path.segments();
        match segments {
            [only] if only == "id" => Some(Value::String(self.id.clone())),
            [first, rest @ ..] => {
                let mut current = self.attributes.get(first)?;
                for segment in rest {
                    current = match current {
                        Value::Object(map) => map.get(segment)?,
                        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                Some(current.clone())
            }
            [] => None,
        }
    }
}
