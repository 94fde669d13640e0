//! Operation variables and built-in scalar coercion for weft.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Variable values supplied with an operation.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: Map<String, Value>,
}

impl Variables {
    /// Creates an empty variable set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a variable by name.
    pub fn try_get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns true if the variable was supplied, even as an explicit null.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Looks up a variable and deserializes it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.values
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Inserts a variable value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Returns the number of supplied variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no variables were supplied.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for Variables {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl From<Value> for Variables {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }
}

/// Coerces a runtime value to one of the built-in scalars.
///
/// Unknown scalar names pass the value through untouched; custom scalars
/// attach their own hooks at the schema level.
pub fn convert_scalar(name: &str, value: &Value) -> Result<Value, String> {
    match name {
        "Int" => match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i32::try_from(i).is_ok() {
                        return Ok(Value::Number((i).into()));
                    }
                    return Err(format!("Int cannot represent value out of range: {i}"));
                }
                if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 {
                        return Ok(Value::Number((f as i64).into()));
                    }
                }
                Err(format!("Int cannot represent non-integer value: {value}"))
            }
            _ => Err(format!("Int cannot represent non-integer value: {value}")),
        },
        "Float" => match value {
            Value::Number(_) => Ok(value.clone()),
            _ => Err(format!("Float cannot represent non-numeric value: {value}")),
        },
        "String" => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(format!("String cannot represent a non-string value: {value}")),
        },
        "Boolean" => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(format!(
                "Boolean cannot represent a non-boolean value: {value}"
            )),
        },
        "ID" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) if n.as_i64().is_some() => Ok(Value::String(n.to_string())),
            _ => Err(format!("ID cannot represent value: {value}")),
        },
        _ => Ok(value.clone()),
    }
}
