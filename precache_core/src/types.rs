//! Type definitions for captured calls

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Argument type pattern that matches any concrete type
pub const ANY_TYPE: &str = "Any";

/// A concrete call specialization: routine identity plus the argument types
/// actually bound at the call site
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSignature {
    /// Identity of the invoked routine
    pub routine: String,

    /// Concrete argument types, in call order
    pub arg_types: Vec<String>,
}

impl CallSignature {
    /// Create a signature from a routine name and argument types
    pub fn new<R, I, T>(routine: R, arg_types: I) -> Self
    where
        R: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            routine: routine.into(),
            arg_types: arg_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Build the signature a dynamic call with these arguments resolves to
    pub fn of_call(routine: &str, args: &[Value]) -> Self {
        Self {
            routine: routine.to_string(),
            arg_types: args.iter().map(|a| a.type_name().to_string()).collect(),
        }
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.routine, self.arg_types.join(", "))
    }
}

/// Runtime value type
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    /// Concrete type name used in call signatures
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Nothing",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int64",
            Value::Float(_) => "Float64",
            Value::String(_) => "String",
            Value::Array(_) => "Vector",
            Value::Object(_) => "Dict",
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_structural_equality() {
        let a = CallSignature::new("push", ["Vector", "Int64"]);
        let b = CallSignature::of_call("push", &[Value::Array(vec![]), Value::Int(3)]);
        assert_eq!(a, b);
        assert_ne!(a, CallSignature::new("push", ["Vector", "Float64"]));
    }

    #[test]
    fn test_signature_display() {
        let sig = CallSignature::new("sum", ["Vector"]);
        assert_eq!(sig.to_string(), "sum(Vector)");
        assert_eq!(CallSignature::new("now", Vec::<String>::new()).to_string(), "now()");
    }
}
