use std::{
    fmt,
    hash::{Hash, Hasher},
};

use ecow::EcoVec;
use serde::*;

/// A constant value that can appear in a pipeline
///
/// Numbers compare and hash by their bit pattern so that nodes containing
/// them can be hashed and cached. `-0.0` is normalized to `0.0`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A scalar number
    Num(f64),
    /// A list of values
    List(EcoVec<Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Num(0.0)
    }
}

fn norm_bits(n: f64) -> u64 {
    if n == 0.0 {
        0f64.to_bits()
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => norm_bits(*a) == norm_bits(*b),
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Num(n) => {
                0u8.hash(state);
                norm_bits(*n).hash(state);
            }
            Value::List(items) => {
                1u8.hash(state);
                items.len().hash(state);
                for item in items {
                    item.hash(state);
                }
            }
        }
    }
}

impl Value {
    /// Get the value as a number, if it is one
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::List(_) => None,
        }
    }
    /// Get the value as a natural number, if it is one
    pub fn as_nat(&self) -> Option<usize> {
        self.as_num()
            .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= u32::MAX as f64)
            .map(|n| n as usize)
    }
    /// Get the items of a list
    pub fn as_list(&self) -> Option<&EcoVec<Value>> {
        match self {
            Value::List(items) => Some(items),
            Value::Num(_) => None,
        }
    }
    /// Get the number of rows in the value
    ///
    /// Scalars have a single row
    pub fn row_count(&self) -> usize {
        match self {
            Value::Num(_) => 1,
            Value::List(items) => items.len(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Num(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Num(n as f64)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone, const N: usize> From<[T; N]> for Value {
    fn from(items: [T; N]) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::List(iter.into_iter().collect())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) if *n < 0.0 => write!(f, "¯{}", -n),
            Value::Num(n) => write!(f, "{n}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}
