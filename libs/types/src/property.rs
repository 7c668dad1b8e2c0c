//! Tagged property values and the per-message property bag
//!
//! Messages carry metadata as a map of [`PropertyId`] to [`PropertyValue`].
//! The value type is a closed sum: every holder knows the full set of
//! shapes a property can take, and typed access fails with a
//! [`ValueError::TypeMismatch`] instead of a downcast surprise.
//!
//! Cloning a bag produces independent owned copies of every value. Custom
//! values participate through [`CustomValue::clone_value`]. Opaque values
//! are immutable by contract: typed access hands out shared references
//! only, so clones may share the same allocation without aliasing any
//! mutable state.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// Tag identifying which variant a [`PropertyValue`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTag {
    None,
    Bool,
    Int,
    Double,
    Str,
    Buffer,
    Opaque,
    Custom,
}

/// Container shape of a [`PropertyValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Simple,
    Range,
    List,
}

/// Errors raised by typed access to property values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The held tag disagrees with the requested type.
    #[error("value type mismatch: expected {expected:?}, found {actual:?}")]
    TypeMismatch { expected: ValueTag, actual: ValueTag },
}

/// User-defined property payloads that still honor deep-clone semantics.
pub trait CustomValue: fmt::Debug + Send + Sync {
    /// Produces an independent owned copy of this value.
    fn clone_value(&self) -> Arc<dyn CustomValue>;

    /// Access to the concrete type for callers that know what they stored.
    fn as_any(&self) -> &dyn Any;

    /// Human-readable rendering for logs.
    fn render(&self) -> String;
}

/// A tagged, cloneable variant used as message metadata and generic
/// configuration values.
#[derive(Debug)]
pub enum PropertyValue {
    None,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Buffer(Bytes),
    /// Arbitrary typed payload, immutable by contract.
    /// [`as_opaque`](PropertyValue::as_opaque) hands out shared references
    /// only and clones share the allocation; a payload that needs per-clone
    /// mutation belongs in [`Custom`](PropertyValue::Custom) with its
    /// [`CustomValue::clone_value`] hook.
    Opaque(Arc<dyn Any + Send + Sync>),
    /// User-defined payload with deep-clone support.
    Custom(Arc<dyn CustomValue>),
    IntRange(i64, i64),
    DoubleRange(f64, f64),
    IntList(Vec<i64>),
    StrList(Vec<String>),
}

impl PropertyValue {
    pub fn tag(&self) -> ValueTag {
        match self {
            PropertyValue::None => ValueTag::None,
            PropertyValue::Bool(_) => ValueTag::Bool,
            PropertyValue::Int(_) | PropertyValue::IntRange(..) | PropertyValue::IntList(_) => {
                ValueTag::Int
            }
            PropertyValue::Double(_) | PropertyValue::DoubleRange(..) => ValueTag::Double,
            PropertyValue::Str(_) | PropertyValue::StrList(_) => ValueTag::Str,
            PropertyValue::Buffer(_) => ValueTag::Buffer,
            PropertyValue::Opaque(_) => ValueTag::Opaque,
            PropertyValue::Custom(_) => ValueTag::Custom,
        }
    }

    pub fn shape(&self) -> ValueShape {
        match self {
            PropertyValue::IntRange(..) | PropertyValue::DoubleRange(..) => ValueShape::Range,
            PropertyValue::IntList(_) | PropertyValue::StrList(_) => ValueShape::List,
            _ => ValueShape::Simple,
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            PropertyValue::Bool(v) => Ok(*v),
            other => Err(ValueError::TypeMismatch {
                expected: ValueTag::Bool,
                actual: other.tag(),
            }),
        }
    }

    pub fn as_int(&self) -> Result<i64, ValueError> {
        match self {
            PropertyValue::Int(v) => Ok(*v),
            other => Err(ValueError::TypeMismatch {
                expected: ValueTag::Int,
                actual: other.tag(),
            }),
        }
    }

    pub fn as_double(&self) -> Result<f64, ValueError> {
        match self {
            PropertyValue::Double(v) => Ok(*v),
            other => Err(ValueError::TypeMismatch {
                expected: ValueTag::Double,
                actual: other.tag(),
            }),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            PropertyValue::Str(v) => Ok(v),
            other => Err(ValueError::TypeMismatch {
                expected: ValueTag::Str,
                actual: other.tag(),
            }),
        }
    }

    pub fn as_buffer(&self) -> Result<&Bytes, ValueError> {
        match self {
            PropertyValue::Buffer(v) => Ok(v),
            other => Err(ValueError::TypeMismatch {
                expected: ValueTag::Buffer,
                actual: other.tag(),
            }),
        }
    }

    /// Downcasts an opaque value to a concrete type.
    pub fn as_opaque<T: Any + Send + Sync>(&self) -> Result<Option<&T>, ValueError> {
        match self {
            PropertyValue::Opaque(v) => Ok(v.downcast_ref::<T>()),
            other => Err(ValueError::TypeMismatch {
                expected: ValueTag::Opaque,
                actual: other.tag(),
            }),
        }
    }
}

impl Clone for PropertyValue {
    fn clone(&self) -> Self {
        match self {
            PropertyValue::None => PropertyValue::None,
            PropertyValue::Bool(v) => PropertyValue::Bool(*v),
            PropertyValue::Int(v) => PropertyValue::Int(*v),
            PropertyValue::Double(v) => PropertyValue::Double(*v),
            PropertyValue::Str(v) => PropertyValue::Str(v.clone()),
            PropertyValue::Buffer(v) => PropertyValue::Buffer(v.clone()),
            // Opaque values are immutable by contract, so sharing the Arc
            // still gives clone-independence to observers.
            PropertyValue::Opaque(v) => PropertyValue::Opaque(Arc::clone(v)),
            PropertyValue::Custom(v) => PropertyValue::Custom(v.clone_value()),
            PropertyValue::IntRange(lo, hi) => PropertyValue::IntRange(*lo, *hi),
            PropertyValue::DoubleRange(lo, hi) => PropertyValue::DoubleRange(*lo, *hi),
            PropertyValue::IntList(v) => PropertyValue::IntList(v.clone()),
            PropertyValue::StrList(v) => PropertyValue::StrList(v.clone()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::None => write!(f, "none"),
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::Str(v) => write!(f, "{v}"),
            PropertyValue::Buffer(v) => write!(f, "buffer[{}]", v.len()),
            PropertyValue::Opaque(_) => write!(f, "opaque"),
            PropertyValue::Custom(v) => write!(f, "{}", v.render()),
            PropertyValue::IntRange(lo, hi) => write!(f, "[{lo}..{hi}]"),
            PropertyValue::DoubleRange(lo, hi) => write!(f, "[{lo}..{hi}]"),
            PropertyValue::IntList(v) => write!(f, "{v:?}"),
            PropertyValue::StrList(v) => write!(f, "{v:?}"),
        }
    }
}

/// Well-known property keys plus an extension range for architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyId {
    DestId,
    SrcId,
    DestLocator,
    SrcLocator,
    MultiDestLocator,
    NextHopLocator,
    NetletId,
    ServiceId,
    AutoForward,
    OptString,
    Method,
    EndOfStream,
    /// Architecture-specific keys start here.
    User(u16),
}

/// The metadata map attached to every message. Keys are unique; insertion
/// order is irrelevant.
#[derive(Debug, Clone, Default)]
pub struct PropertyBag {
    entries: HashMap<PropertyId, PropertyValue>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: PropertyId, value: PropertyValue) {
        self.entries.insert(id, value);
    }

    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.entries.get(&id)
    }

    pub fn take(&mut self, id: PropertyId) -> Option<PropertyValue> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: PropertyId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyId, &PropertyValue)> {
        self.entries.iter()
    }
}
