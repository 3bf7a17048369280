//! Concrete values read back from a solver model

use std::fmt;

use num_bigint::BigInt;
use serde::{Serialize, Serializer};

use super::sexp::Sexp;

/// Tagged value of a term in a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalValue {
    True,
    False,
    /// Arbitrary-precision integer literal
    Int(BigInt),
    /// Anything else the solver may print (reals, arrays, ...)
    Other(String),
}

impl LogicalValue {
    pub fn from_sexp(sexp: &Sexp) -> Self {
        match sexp {
            Sexp::Atom(a) if a == "true" => LogicalValue::True,
            Sexp::Atom(a) if a == "false" => LogicalValue::False,
            Sexp::Atom(a) => match a.parse::<BigInt>() {
                Ok(n) if !a.starts_with(['-', '+']) => LogicalValue::Int(n),
                _ => LogicalValue::Other(a.clone()),
            },
            Sexp::List(items) => match items.as_slice() {
                [Sexp::Atom(minus), Sexp::Atom(digits)] if minus == "-" => {
                    match digits.parse::<BigInt>() {
                        Ok(n) if !digits.starts_with(['-', '+']) => LogicalValue::Int(-n),
                        _ => LogicalValue::Other(sexp.to_string()),
                    }
                }
                _ => LogicalValue::Other(sexp.to_string()),
            },
        }
    }
}

impl From<bool> for LogicalValue {
    fn from(b: bool) -> Self {
        if b { LogicalValue::True } else { LogicalValue::False }
    }
}

impl From<i64> for LogicalValue {
    fn from(n: i64) -> Self {
        LogicalValue::Int(BigInt::from(n))
    }
}

impl fmt::Display for LogicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalValue::True => write!(f, "true"),
            LogicalValue::False => write!(f, "false"),
            LogicalValue::Int(n) => write!(f, "{n}"),
            LogicalValue::Other(s) => write!(f, "{s}"),
        }
    }
}

impl Serialize for LogicalValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
