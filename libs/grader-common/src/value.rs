/// Value Model - JSON-sourced test data
///
/// Test inputs and expected outputs arrive as JSON and stay dynamically typed.
/// Two Values are equal when they are structurally equal:
/// - numbers compare by numeric value (`5` equals `5.0`)
/// - arrays compare element-wise, in order
/// - objects compare key-wise, ignoring key order
/// - everything else compares by value

use serde::{Deserialize, Serialize};
use std::fmt;

pub use serde_json::{Map, Number, Value};

/// Deep value equality between an actual and an expected Value
pub fn structural_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => numbers_eq(a, b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| structural_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| structural_eq(x, y)))
        }
        _ => actual == expected,
    }
}

fn numbers_eq(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Type of a Value as inferred from its decoded representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Null,
    Boolean,
    /// Integer within 32-bit range
    Integer,
    /// Integer outside 32-bit range
    Long,
    Double,
    String,
    List,
    Map,
}

impl RuntimeType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => RuntimeType::Null,
            Value::Bool(_) => RuntimeType::Boolean,
            Value::Number(n) => match n.as_i64() {
                Some(i) if i32::try_from(i).is_ok() => RuntimeType::Integer,
                Some(_) => RuntimeType::Long,
                None if n.is_u64() => RuntimeType::Long,
                None => RuntimeType::Double,
            },
            Value::String(_) => RuntimeType::String,
            Value::Array(_) => RuntimeType::List,
            Value::Object(_) => RuntimeType::Map,
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeType::Null => "null",
            RuntimeType::Boolean => "boolean",
            RuntimeType::Integer => "integer",
            RuntimeType::Long => "long",
            RuntimeType::Double => "double",
            RuntimeType::String => "string",
            RuntimeType::List => "list",
            RuntimeType::Map => "map",
        };
        f.write_str(name)
    }
}
