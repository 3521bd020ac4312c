//! Typed operation parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter key carrying the target device id.
pub const TARGET_KEY: &str = "udid";

/// A single scalar parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Parameter mapping; ordered so serialized invocations are deterministic.
pub type Params = BTreeMap<String, ParamValue>;

/// A named unit of benchmarked work shared by every candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    /// Operation-scoped parameters; `None` when the operation declares none.
    #[serde(default)]
    pub params: Option<Params>,
    /// Whether the target device id must be passed even without parameters.
    #[serde(default = "default_needs_target")]
    pub needs_target: bool,
}

fn default_needs_target() -> bool {
    true
}

impl Operation {
    /// Operation without parameters that still targets the device.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: None,
            needs_target: true,
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params
            .get_or_insert_with(Params::new)
            .insert(key.into(), value.into());
        self
    }

    /// Mark the operation as device-independent.
    pub fn without_target(mut self) -> Self {
        self.needs_target = false;
        self
    }

    /// Operation parameters merged with the target id.
    ///
    /// Returns `None` only when the operation has no parameters and does not
    /// need the target. The target key always appears exactly once.
    pub fn merged_params(&self, target_id: &str) -> Option<Params> {
        match &self.params {
            Some(params) => {
                let mut merged = params.clone();
                merged.insert(TARGET_KEY.to_string(), ParamValue::from(target_id));
                Some(merged)
            }
            None if self.needs_target => {
                let mut merged = Params::new();
                merged.insert(TARGET_KEY.to_string(), ParamValue::from(target_id));
                Some(merged)
            }
            None => None,
        }
    }
}
