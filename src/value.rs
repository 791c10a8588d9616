//! The dynamic value universe of the MMDB data section.
//!
//! Every value stored in a MaxMind DB is self-describing; decoding produces
//! a [`Value`] tree. Pointers in the data section are resolved transparently
//! by the decoder and never appear here.

use std::collections::BTreeMap;

/// A decoded MaxMind DB value.
///
/// `uint128` fields carry a dual surface: the decoder produces
/// [`Value::Uint64`] when the stored payload fits in 8 bytes (which covers
/// every database MaxMind currently ships) and [`Value::Uint128`] only for
/// wider payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string. Invalid UTF-8 in the database is preserved best-effort
    /// via lossy conversion.
    String(String),
    /// Raw bytes, copied out of the database buffer.
    Bytes(Vec<u8>),
    /// Boolean.
    Bool(bool),
    /// 64-bit IEEE-754 float.
    Double(f64),
    /// 32-bit IEEE-754 float.
    Float(f32),
    /// Unsigned 16-bit integer.
    Uint16(u16),
    /// Unsigned 32-bit integer.
    Uint32(u32),
    /// Unsigned 64-bit integer.
    Uint64(u64),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 128-bit integer (only for payloads wider than 8 bytes).
    Uint128(u128),
    /// Array of values.
    Array(Vec<Value>),
    /// Map with string keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the string slice if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the raw bytes if this value is a byte array.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the boolean if this value is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns an `f64` if this value is a double or float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Float(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    /// Returns a `u16` if this value is an unsigned integer that fits.
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::Uint16(n) => Some(*n),
            Value::Uint32(n) => u16::try_from(*n).ok(),
            Value::Uint64(n) => u16::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Returns a `u32` if this value is an unsigned integer that fits.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Uint16(n) => Some(u32::from(*n)),
            Value::Uint32(n) => Some(*n),
            Value::Uint64(n) => u32::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Returns a `u64` if this value is an unsigned integer that fits.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint16(n) => Some(u64::from(*n)),
            Value::Uint32(n) => Some(u64::from(*n)),
            Value::Uint64(n) => Some(*n),
            Value::Uint128(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Returns an `i32` if this value is a signed 32-bit integer.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the map if this value is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the element slice if this value is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// A short name for the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Bool(_) => "boolean",
            Value::Double(_) => "double",
            Value::Float(_) => "float",
            Value::Uint16(_) => "uint16",
            Value::Uint32(_) => "uint32",
            Value::Uint64(_) => "uint64",
            Value::Int32(_) => "int32",
            Value::Uint128(_) => "uint128",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }
}
