//! Runtime values flowing through contexts, functions and evaluation results.
//!
//! - `VariableType`: the five types a variable may be declared with
//! - `VariableValue`: tagged union over those types, plus `Null` and `Map`
//!   which only appear as evaluation intermediates (namespace roots,
//!   `candle()` results, missing list elements)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Float,
    Int,
    Bool,
    String,
    List,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Float => "float",
            VariableType::Int => "int",
            VariableType::Bool => "bool",
            VariableType::String => "string",
            VariableType::List => "list",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "float" | "double" => Some(VariableType::Float),
            "int" => Some(VariableType::Int),
            "bool" => Some(VariableType::Bool),
            "string" => Some(VariableType::String),
            "list" => Some(VariableType::List),
            _ => None,
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum VariableValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<VariableValue>),
    Map(BTreeMap<String, VariableValue>),
}

impl VariableValue {
    /// Type name as reported by the `type()` built-in.
    pub fn type_name(&self) -> &'static str {
        match self {
            VariableValue::Null => "null_type",
            VariableValue::Bool(_) => "bool",
            VariableValue::Int(_) => "int",
            VariableValue::Float(_) => "double",
            VariableValue::String(_) => "string",
            VariableValue::List(_) => "list",
            VariableValue::Map(_) => "map",
        }
    }

    pub fn declared_type(&self) -> Option<VariableType> {
        match self {
            VariableValue::Bool(_) => Some(VariableType::Bool),
            VariableValue::Int(_) => Some(VariableType::Int),
            VariableValue::Float(_) => Some(VariableType::Float),
            VariableValue::String(_) => Some(VariableType::String),
            VariableValue::List(_) => Some(VariableType::List),
            VariableValue::Null | VariableValue::Map(_) => None,
        }
    }

    /// Int is accepted where float is declared; everything else must match exactly.
    pub fn matches_type(&self, declared: VariableType) -> bool {
        match (self, declared) {
            (VariableValue::Int(_), VariableType::Float) => true,
            _ => self.declared_type() == Some(declared),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, VariableValue::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, VariableValue::Int(_) | VariableValue::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            VariableValue::Int(i) => Some(*i as f64),
            VariableValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            VariableValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VariableValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VariableValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[VariableValue]> {
        match self {
            VariableValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, VariableValue>> {
        match self {
            VariableValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Equality with int/float widening, applied element-wise to lists and maps.
    pub fn loose_eq(&self, other: &VariableValue) -> bool {
        match (self, other) {
            (VariableValue::Int(a), VariableValue::Float(b))
            | (VariableValue::Float(b), VariableValue::Int(a)) => (*a as f64) == *b,
            (VariableValue::List(a), VariableValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (VariableValue::Map(a), VariableValue::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
            }
            _ => self == other,
        }
    }

    /// Parse a command-line style literal: int, float, bool, otherwise string.
    pub fn parse_literal(text: &str) -> VariableValue {
        let trimmed = text.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return VariableValue::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return VariableValue::Float(f);
        }
        match trimmed {
            "true" => VariableValue::Bool(true),
            "false" => VariableValue::Bool(false),
            "null" => VariableValue::Null,
            _ => VariableValue::String(text.to_string()),
        }
    }

    /// NaN and infinities have no JSON form and come out as `null`; project
    /// variables refuse them up front.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            VariableValue::Null => serde_json::Value::Null,
            VariableValue::Bool(b) => serde_json::Value::Bool(*b),
            VariableValue::Int(i) => serde_json::Value::from(*i),
            VariableValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            VariableValue::String(s) => serde_json::Value::String(s.clone()),
            VariableValue::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect())
            }
            VariableValue::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> VariableValue {
        match value {
            serde_json::Value::Null => VariableValue::Null,
            serde_json::Value::Bool(b) => VariableValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => VariableValue::Int(i),
                None => VariableValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => VariableValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                VariableValue::List(items.iter().map(VariableValue::from_json).collect())
            }
            serde_json::Value::Object(m) => VariableValue::Map(
                m.iter()
                    .map(|(k, v)| (k.clone(), VariableValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Null => write!(f, "null"),
            VariableValue::Bool(b) => write!(f, "{}", b),
            VariableValue::Int(i) => write!(f, "{}", i),
            VariableValue::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            VariableValue::String(s) => write!(f, "{}", s),
            VariableValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match item {
                        VariableValue::String(s) => write!(f, "\"{}\"", s)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                write!(f, "]")
            }
            VariableValue::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for VariableValue {
    fn from(v: bool) -> Self {
        VariableValue::Bool(v)
    }
}

impl From<i64> for VariableValue {
    fn from(v: i64) -> Self {
        VariableValue::Int(v)
    }
}

impl From<f64> for VariableValue {
    fn from(v: f64) -> Self {
        VariableValue::Float(v)
    }
}

impl From<&str> for VariableValue {
    fn from(v: &str) -> Self {
        VariableValue::String(v.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(v: String) -> Self {
        VariableValue::String(v)
    }
}

impl From<Vec<VariableValue>> for VariableValue {
    fn from(v: Vec<VariableValue>) -> Self {
        VariableValue::List(v)
    }
}
