//! Dynamic values and the variable context.
//!
//! Template variables are dynamically typed. Rather than ad hoc type
//! inspection, every value flowing through the engine is an explicit
//! [`Value`] with exhaustive matching at each consumption site. The
//! [`VariableContext`] is a scope stack: loop iterations push a child scope
//! whose bindings shadow the parent and are popped when the loop ends, so
//! nothing ever leaks back out.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A dynamically typed template value.
///
/// Equality is deep and structural for every shape, matching common
/// templating semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Truthiness: `false`, `0`, `""`, `null`, and empty collections are
    /// falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Array(a) => !a.is_empty(),
            Self::Object(o) => !o.is_empty(),
        }
    }

    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// The string form substituted for a `{{ }}` reference.
    ///
    /// Whole numbers render without a fractional part; `null` renders as
    /// the empty string; arrays and objects render as JSON.
    pub fn display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Array(_) | Self::Object(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// Navigate one step into the value by object key or array index.
    pub fn get(&self, segment: &str) -> Option<&Value> {
        match self {
            Self::Object(map) => map.get(segment),
            Self::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Ordered name-to-value mapping with nested dotted-path lookup and scoped
/// child contexts.
///
/// The context is a stack of scopes. Lookup resolves the first path segment
/// against the scopes from innermost to outermost, then navigates the
/// remaining segments through objects and arrays. The renderer pushes a
/// scope for each loop iteration and pops it afterwards; callers only ever
/// see the root scope they built.
#[derive(Debug, Clone, Serialize)]
pub struct VariableContext {
    scopes: Vec<BTreeMap<String, Value>>,
}

impl Default for VariableContext {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableContext {
    /// Create an empty context with a single root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![BTreeMap::new()],
        }
    }

    /// Build a context from a JSON object; non-object values produce an
    /// empty context.
    pub fn from_json(json: serde_json::Value) -> Self {
        let mut ctx = Self::new();
        if let serde_json::Value::Object(map) = json {
            for (name, value) in map {
                ctx.insert(name, Value::from(value));
            }
        }
        ctx
    }

    /// Insert a binding into the innermost scope.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        if let Some(top) = self.scopes.last_mut() {
            top.insert(name.into(), value);
        }
    }

    /// Push a child scope. Bindings added afterwards shadow the parent.
    pub fn push_scope(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    /// Pop the innermost scope. The root scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Resolve a dotted path (`item.name`, `items.0.id`) to a value.
    ///
    /// Returns `None` when the root name is unbound or any intermediate
    /// segment does not navigate.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let root = segments.next()?;
        let mut current = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(root))?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Whether a root name is bound in any scope.
    pub fn contains(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains_key(name))
    }

    /// Stable fingerprint of the full context contents, used as part of
    /// the render cache key.
    pub fn fingerprint(&self) -> u64 {
        let serialized = serde_json::to_string(&self.scopes).unwrap_or_default();
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        serialized.hash(&mut hasher);
        hasher.finish()
    }
}
