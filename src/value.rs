//! Runtime values for the reference codec.

use crate::ast::{NumericClass, PrimitiveType};

/// A single decoded value (member or compound).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    /// An enumerator and its declared raw value.
    Enum { variant: String, raw: i128 },
    /// Contents of a `bytes` or `string` field.
    Bytes(Vec<u8>),
    Struct(Record),
    List(Vec<Value>),
}

impl Value {
    /// Typed integer for `prim`, or `None` if `value` is out of its range.
    pub fn from_int(prim: &PrimitiveType, value: i128) -> Option<Value> {
        if !prim.contains(value) {
            return None;
        }
        Some(match prim.name {
            "u8" => Value::U8(value as u8),
            "u16" => Value::U16(value as u16),
            "u32" => Value::U32(value as u32),
            "u64" => Value::U64(value as u64),
            "i8" => Value::I8(value as i8),
            "i16" => Value::I16(value as i16),
            "i32" => Value::I32(value as i32),
            "i64" => Value::I64(value as i64),
            _ => return None,
        })
    }

    /// Zero of `prim`.
    pub fn zero(prim: &PrimitiveType) -> Value {
        match (prim.class, prim.size) {
            (NumericClass::Float, 4) => Value::Float(0.0),
            (NumericClass::Float, _) => Value::Double(0.0),
            _ => Value::from_int(prim, 0).unwrap_or(Value::U64(0)),
        }
    }

    /// Integer view used by guards and range checks: integers as is, `bool` as 0/1, enums
    /// as their raw value.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::U8(x) => Some(*x as i128),
            Value::U16(x) => Some(*x as i128),
            Value::U32(x) => Some(*x as i128),
            Value::U64(x) => Some(*x as i128),
            Value::I8(x) => Some(*x as i128),
            Value::I16(x) => Some(*x as i128),
            Value::I32(x) => Some(*x as i128),
            Value::I64(x) => Some(*x as i128),
            Value::Bool(b) => Some(*b as i128),
            Value::Enum { raw, .. } => Some(*raw),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x as f64),
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Record> {
        match self {
            Value::Struct(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Enumerator name, for enum values.
    pub fn variant(&self) -> Option<&str> {
        match self {
            Value::Enum { variant, .. } => Some(variant),
            _ => None,
        }
    }

    /// An enum value naming `variant`. The raw number is filled in when encoding.
    pub fn enumerator(variant: impl Into<String>) -> Value {
        Value::Enum {
            variant: variant.into(),
            raw: 0,
        }
    }
}

/// Members of one struct instance in declaration order. Bitfield slices appear as
/// members of their own; padding never does.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    members: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Replace a member's value, or append it if absent.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.members.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.members.push((name, value)),
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Value at a dotted path through nested structs, e.g. `["hdr", "kind"]`.
    pub fn lookup_path(&self, path: &[String]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.get(first)?;
        for segment in rest {
            current = current.as_struct()?.get(segment)?;
        }
        Some(current)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.members.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
