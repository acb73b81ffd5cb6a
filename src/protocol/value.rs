use std::fmt;

use serde_json::{Number, Value};

/// Value of a `setSetting` request.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl SettingValue {
    /// Decodes a JSON value. Shapes without a matching variant (null,
    /// arrays, objects) keep their JSON text as a string.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(b) => SettingValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SettingValue::Int(i),
                None => SettingValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SettingValue::String(s.clone()),
            other => SettingValue::String(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SettingValue::Int(i) => Value::from(*i),
            SettingValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            SettingValue::Bool(b) => Value::Bool(*b),
            SettingValue::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<&Value> for SettingValue {
    fn from(value: &Value) -> Self {
        Self::from_json(value)
    }
}

impl From<SettingValue> for Value {
    fn from(value: SettingValue) -> Self {
        value.to_json()
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Int(i) => write!(f, "{}", i),
            SettingValue::Float(v) => write!(f, "{}", v),
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::String(s) => write!(f, "{}", s),
        }
    }
}
