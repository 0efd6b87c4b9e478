// ── Dot-path value extraction ──
//
// A `PathValue<T>` remembers a dot-separated path and the last value it
// resolved to. Absence is a normal outcome: a missing segment or a value
// of the wrong shape leaves it unresolved.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Anything that can re-read itself from a wire document.
///
/// Entities hand their `PathValue` fields out as `&mut dyn Extract` so the
/// wire mapper can refresh them without knowing their value types.
pub trait Extract {
    fn extract(&mut self, document: &Value);
}

/// A typed value bound to a dot-separated path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned"))]
pub struct PathValue<T> {
    path: String,
    value: Option<T>,
}

impl<T> Default for PathValue<T> {
    fn default() -> Self {
        Self {
            path: String::new(),
            value: None,
        }
    }
}

impl<T: DeserializeOwned> PathValue<T> {
    /// Bind to `path`. The value starts unresolved.
    pub fn bind(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: None,
        }
    }

    /// Bind and extract in one step.
    pub fn resolve(path: impl Into<String>, document: &Value) -> Self {
        let mut bound = Self::bind(path);
        bound.extract_from(document);
        bound
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_inner(self) -> Option<T> {
        self.value
    }

    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    /// Forget the resolved value, keeping the path.
    pub fn clear(&mut self) {
        self.value = None;
    }

    /// Walk `document` along the bound path and capture the value.
    ///
    /// Overwrites any earlier value: when the path does not resolve in
    /// this document the result is unresolved.
    pub fn extract_from(&mut self, document: &Value) {
        self.value = lookup(document, &self.path).and_then(|v| T::deserialize(v).ok());
    }
}

impl<T: DeserializeOwned> Extract for PathValue<T> {
    fn extract(&mut self, document: &Value) {
        self.extract_from(document);
    }
}

/// Descend `document` one `.`-separated segment at a time.
///
/// Object keys match literally; a segment that parses as an index selects
/// an array element.
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(document, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
