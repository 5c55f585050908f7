//! Unstructured `uns` metadata as an opaque value tree.

use std::collections::BTreeMap;

/// One `uns` entry: a scalar, a one-dimensional array, or a nested dict.
///
/// Both accessors store entries as child nodes of the `uns` group using the
/// AnnData encodings `string`, `numeric-scalar`, `string-array`, `array`, and
/// `dict`.
#[derive(Debug, Clone, PartialEq)]
pub enum UnsValue {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Strings(Vec<String>),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Dict(BTreeMap<String, UnsValue>),
}

impl UnsValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            UnsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, UnsValue>> {
        match self {
            UnsValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a nested entry by a `/`-separated path.
    pub fn get_path(&self, path: &str) -> Option<&UnsValue> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .try_fold(self, |node, key| node.as_dict()?.get(key))
    }

    /// AnnData `encoding-type` for this value.
    pub fn encoding_type(&self) -> &'static str {
        match self {
            UnsValue::String(_) => "string",
            UnsValue::Bool(_) | UnsValue::Int(_) | UnsValue::Float(_) => "numeric-scalar",
            UnsValue::Strings(_) => "string-array",
            UnsValue::Ints(_) | UnsValue::Floats(_) => "array",
            UnsValue::Dict(_) => "dict",
        }
    }

    /// AnnData `encoding-version` for this value.
    pub fn encoding_version(&self) -> &'static str {
        match self {
            UnsValue::Dict(_) => "0.1.0",
            _ => "0.2.0",
        }
    }
}

impl From<&str> for UnsValue {
    fn from(s: &str) -> Self {
        UnsValue::String(s.to_string())
    }
}

impl From<String> for UnsValue {
    fn from(s: String) -> Self {
        UnsValue::String(s)
    }
}

impl From<i64> for UnsValue {
    fn from(v: i64) -> Self {
        UnsValue::Int(v)
    }
}

impl From<f64> for UnsValue {
    fn from(v: f64) -> Self {
        UnsValue::Float(v)
    }
}

impl From<bool> for UnsValue {
    fn from(v: bool) -> Self {
        UnsValue::Bool(v)
    }
}

impl From<BTreeMap<String, UnsValue>> for UnsValue {
    fn from(d: BTreeMap<String, UnsValue>) -> Self {
        UnsValue::Dict(d)
    }
}
