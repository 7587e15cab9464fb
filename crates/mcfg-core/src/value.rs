//! Attribute values and type checking
//!
//! Attribute values are [`serde_json::Value`]s. [`McValue`] adds the two
//! placeholders the build process understands: a value that must still be
//! provided ([`McValue::Required`]) and a deliberately deferred value
//! ([`McValue::Todo`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value given to an attribute setter
#[derive(Debug, Clone, PartialEq)]
pub enum McValue {
    /// Plain value
    Value(Value),
    /// Placeholder: a real value must be set before the item's scope exits
    Required,
    /// Deferred value, only tolerated by envs that allow todo
    Todo,
}

impl McValue {
    /// True for the `Required` placeholder
    #[inline]
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Required)
    }

    /// The plain value, if any
    #[inline]
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for McValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

macro_rules! mc_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for McValue {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

mc_value_from!(bool, i32, i64, u16, u32, u64, usize, f64, &str, String, Vec<Value>);

/// Placeholder for a value that must be set later in the item's scope
#[inline]
#[must_use]
pub fn mc_required() -> McValue {
    McValue::Required
}

/// Deferred value
#[inline]
#[must_use]
pub fn mc_todo() -> McValue {
    McValue::Todo
}

/// Declared kind of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Any value
    #[default]
    Any,
    /// Boolean
    Bool,
    /// Integer
    Int,
    /// Any number
    Number,
    /// String
    Str,
    /// Array
    List,
    /// Object
    Map,
}

impl ValueKind {
    /// True if `value` is of this kind; null is accepted for every kind
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Number, Value::Number(_)) => true,
            (Self::Str, Value::String(_)) => true,
            (Self::List, Value::Array(_)) => true,
            (Self::Map, Value::Object(_)) => true,
            _ => false,
        }
    }
}

/// Type checking hook, called once per accepted plain-value assignment
///
/// A returned message is reported as a definition error at the calling site.
pub trait TypeCheck: Send + Sync {
    /// Check `value` for attribute `attr` of type `schema`
    fn check(&self, schema: &str, attr: &str, kind: ValueKind, value: &Value) -> Option<String>;
}

/// Default type checking against declared [`ValueKind`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct KindCheck;

impl TypeCheck for KindCheck {
    fn check(&self, schema: &str, attr: &str, kind: ValueKind, value: &Value) -> Option<String> {
        if kind.accepts(value) {
            None
        } else {
            Some(format!("expected {kind:?} for '{schema}.{attr}', got {value}"))
        }
    }
}
