use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::ExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
    Exists,
}

impl ConditionOperator {
    /// Wire name, as accepted by `FromStr`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Contains => "contains",
            Self::Exists => "exists",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eq" | "==" => Ok(Self::Eq),
            "ne" | "!=" => Ok(Self::Ne),
            "gt" | ">" => Ok(Self::Gt),
            "lt" | "<" => Ok(Self::Lt),
            "contains" => Ok(Self::Contains),
            "exists" => Ok(Self::Exists),
            other => Err(format!("unknown condition operator '{other}'")),
        }
    }
}

/// Gate on a field of an earlier plugin result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCondition {
    pub plugin_name: String,
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl StepCondition {
    pub fn new(
        plugin_name: impl Into<String>,
        field: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// False when the plugin has no recorded result or the field is absent.
    pub fn evaluate(&self, results: &BTreeMap<String, ExecutionResult>) -> bool {
        let Some(result) = results.get(&self.plugin_name) else {
            return false;
        };
        let Some(actual) = result.field(&self.field) else {
            return false;
        };

        match self.operator {
            ConditionOperator::Eq => values_equal(&actual, &self.value),
            ConditionOperator::Ne => !values_equal(&actual, &self.value),
            ConditionOperator::Gt => compare_numbers(&actual, &self.value, |a, b| a > b),
            ConditionOperator::Lt => compare_numbers(&actual, &self.value, |a, b| a < b),
            ConditionOperator::Contains => contains(&actual, &self.value),
            ConditionOperator::Exists => true,
        }
    }
}

impl fmt::Display for StepCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            ConditionOperator::Exists => write!(f, "{}.{} exists", self.plugin_name, self.field),
            op => write!(f, "{}.{} {} {}", self.plugin_name, self.field, op, self.value),
        }
    }
}

// 1 and 1.0 are equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn compare_numbers(a: &Value, b: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Object(map) => needle.as_str().map(|k| map.contains_key(k)).unwrap_or(false),
        _ => false,
    }
}
