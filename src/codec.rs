//! Reference codec: executes a resolved protocol's wire layout on byte slices.
//!
//! Decoding and encoding follow the same rules the generated `parse`/`serialize` methods
//! do, field by field, so the generated semantics can be exercised without a C++
//! toolchain. Multi-byte values use the unit's byte order.

use crate::ast::{ByteOrder, EnumDef, FieldDef, NumericClass, PrimitiveType};
use crate::bits::{BitPlan, SliceRepr};
use crate::expr::{Env, EvalError, Expr, Name};
use crate::resolve::{ElementKind, FieldKind, ResolvedProtocol};
use crate::value::{Record, Value};
use byteorder::{BigEndian, ByteOrder as Endian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] io::Error),
    #[error("unknown struct: {0}")]
    UnknownStruct(String),
    #[error("{field}: input truncated")]
    Truncated { field: String },
    #[error("{field}: expected {expected:#X}, observed {observed:#X}")]
    OutOfRange {
        field: String,
        expected: i128,
        observed: i128,
    },
    #[error("{field}: condition: {source}")]
    Condition { field: String, source: EvalError },
    #[error("{field}: {message}")]
    Shape { field: String, message: String },
}

/// A decoded struct and how many bytes it consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub record: Record,
    pub consumed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Codec<'a> {
    protocol: &'a ResolvedProtocol,
}

fn shape(field: &str, message: impl Into<String>) -> CodecError {
    CodecError::Shape {
        field: field.to_string(),
        message: message.into(),
    }
}

fn qualify(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

/// Total raw → enumerator conversion, as in the generated `FromRaw`.
fn enum_value(e: &EnumDef, raw: i128) -> Value {
    match e.symbol_for(raw) {
        Some(v) => Value::Enum {
            variant: v.name.clone(),
            raw: v.value,
        },
        None => Value::Enum {
            variant: String::new(),
            raw,
        },
    }
}

impl<'a> Codec<'a> {
    pub fn new(protocol: &'a ResolvedProtocol) -> Self {
        Codec { protocol }
    }

    fn struct_index(&self, name: &str) -> Result<usize, CodecError> {
        self.protocol
            .get_struct(name)
            .ok_or_else(|| CodecError::UnknownStruct(name.to_string()))
    }

    /// Decode one instance of `struct_name` from the front of `bytes`. Trailing bytes are
    /// left alone; `consumed` says where the instance ended.
    pub fn decode(&self, struct_name: &str, bytes: &[u8]) -> Result<Decoded, CodecError> {
        let idx = self.struct_index(struct_name)?;
        let mut cursor = Cursor::new(bytes);
        let record = self.decode_struct(&mut cursor, idx, "")?;
        Ok(Decoded {
            record,
            consumed: cursor.position() as usize,
        })
    }

    /// Encode `record` as `struct_name`. Members the record leaves out take their defaults.
    pub fn encode(&self, struct_name: &str, record: &Record) -> Result<Vec<u8>, CodecError> {
        let idx = self.struct_index(struct_name)?;
        let mut out = Vec::new();
        self.encode_struct(&mut out, idx, record, "")?;
        Ok(out)
    }

    /// Every member of `struct_name` at its default value.
    pub fn default_record(&self, struct_name: &str) -> Result<Record, CodecError> {
        Ok(self.defaults(self.struct_index(struct_name)?))
    }

    fn defaults(&self, idx: usize) -> Record {
        let mut record = Record::new();
        for (f, rf) in self.protocol.fields(idx) {
            self.push_defaults(&mut record, f, &rf.kind);
        }
        record
    }

    fn push_defaults(&self, record: &mut Record, f: &FieldDef, kind: &FieldKind) {
        match kind {
            FieldKind::Padding { .. } => {}
            FieldKind::Bitfield(plan) => {
                for s in &plan.slices {
                    record.set(s.name.clone(), self.slice_default(s.repr));
                }
            }
            FieldKind::Primitive(prim) => {
                let v = f
                    .expected
                    .and_then(|e| Value::from_int(prim, e))
                    .unwrap_or_else(|| Value::zero(prim));
                record.set(f.name.clone(), v);
            }
            FieldKind::Enum(i) => {
                let e = self.protocol.enum_def(*i);
                let raw = f.expected.or_else(|| e.fallback().map(|v| v.value)).unwrap_or(0);
                record.set(f.name.clone(), enum_value(e, raw));
            }
            FieldKind::Struct(i) => record.set(f.name.clone(), Value::Struct(self.defaults(*i))),
            FieldKind::Bytes { len } | FieldKind::String { len } => {
                record.set(f.name.clone(), Value::Bytes(vec![0; *len]))
            }
            FieldKind::Array { element, len } => {
                let elem = self.element_default(*element);
                record.set(f.name.clone(), Value::List(vec![elem; *len]));
            }
        }
    }

    fn element_default(&self, element: ElementKind) -> Value {
        match element {
            ElementKind::Primitive(prim) => Value::zero(prim),
            ElementKind::Enum(i) => {
                let e = self.protocol.enum_def(i);
                enum_value(e, e.fallback().map(|v| v.value).unwrap_or(0))
            }
            ElementKind::Struct(i) => Value::Struct(self.defaults(i)),
        }
    }

    fn slice_default(&self, repr: SliceRepr) -> Value {
        match repr {
            SliceRepr::Bool => Value::Bool(false),
            SliceRepr::Unsigned(prim) => Value::zero(prim),
            SliceRepr::Enum(i) => {
                let e = self.protocol.enum_def(i);
                enum_value(e, e.fallback().map(|v| v.value).unwrap_or(0))
            }
        }
    }

    fn guard_holds(&self, guard: &Expr, record: &Record, field: &str) -> Result<bool, CodecError> {
        let env = RecordEnv {
            record,
            protocol: self.protocol,
        };
        guard.is_true(&env).map_err(|source| CodecError::Condition {
            field: field.to_string(),
            source,
        })
    }

    // ---- decode ----

    fn decode_struct(&self, r: &mut Cursor<&[u8]>, idx: usize, path: &str) -> Result<Record, CodecError> {
        let mut record = Record::new();
        for (f, rf) in self.protocol.fields(idx) {
            let field = qualify(path, &f.name);
            if let Some(guard) = &rf.guard {
                if !self.guard_holds(guard, &record, &field)? {
                    self.push_defaults(&mut record, f, &rf.kind);
                    continue;
                }
            }
            self.decode_field(r, f, &rf.kind, &mut record, &field)?;
        }
        Ok(record)
    }

    fn decode_field(
        &self,
        r: &mut Cursor<&[u8]>,
        f: &FieldDef,
        kind: &FieldKind,
        record: &mut Record,
        field: &str,
    ) -> Result<(), CodecError> {
        let truncated = |_: io::Error| CodecError::Truncated {
            field: field.to_string(),
        };
        match kind {
            FieldKind::Primitive(prim) => {
                let v = self.read_primitive(r, prim).map_err(truncated)?;
                if let (Some(expected), Some(observed)) = (f.expected, v.as_int()) {
                    check_expected(field, expected, observed)?;
                }
                record.set(f.name.clone(), v);
            }
            FieldKind::Enum(i) => {
                let raw = self.read_enum_raw(r, *i).map_err(truncated)?;
                if let Some(expected) = f.expected {
                    check_expected(field, expected, raw)?;
                }
                record.set(f.name.clone(), enum_value(self.protocol.enum_def(*i), raw));
            }
            FieldKind::Struct(i) => {
                let nested = self.decode_struct(r, *i, field)?;
                record.set(f.name.clone(), Value::Struct(nested));
            }
            FieldKind::Bytes { len } | FieldKind::String { len } => {
                let mut buf = vec![0u8; *len];
                r.read_exact(&mut buf).map_err(truncated)?;
                record.set(f.name.clone(), Value::Bytes(buf));
            }
            FieldKind::Array { element, len } => {
                let mut items = Vec::with_capacity(*len);
                for i in 0..*len {
                    let item = format!("{}[{}]", field, i);
                    items.push(self.decode_element(r, *element, &item)?);
                }
                record.set(f.name.clone(), Value::List(items));
            }
            FieldKind::Bitfield(plan) => {
                let raw = self.read_unsigned(r, plan.storage).map_err(truncated)?;
                for (s, bits) in plan.slices.iter().zip(plan.unpack(raw)) {
                    let v = match s.repr {
                        SliceRepr::Bool => Value::Bool(bits != 0),
                        SliceRepr::Unsigned(prim) => Value::from_int(prim, bits as i128)
                            .ok_or_else(|| shape(field, format!("slice '{}' value {} does not fit", s.name, bits)))?,
                        SliceRepr::Enum(i) => enum_value(self.protocol.enum_def(i), bits as i128),
                    };
                    record.set(s.name.clone(), v);
                }
            }
            FieldKind::Padding { size } => {
                let end = r.position() + *size as u64;
                if end > r.get_ref().len() as u64 {
                    return Err(truncated(io::ErrorKind::UnexpectedEof.into()));
                }
                r.set_position(end);
            }
        }
        Ok(())
    }

    fn decode_element(&self, r: &mut Cursor<&[u8]>, element: ElementKind, item: &str) -> Result<Value, CodecError> {
        let truncated = |_: io::Error| CodecError::Truncated {
            field: item.to_string(),
        };
        Ok(match element {
            ElementKind::Primitive(prim) => self.read_primitive(r, prim).map_err(truncated)?,
            ElementKind::Enum(i) => {
                let raw = self.read_enum_raw(r, i).map_err(truncated)?;
                enum_value(self.protocol.enum_def(i), raw)
            }
            ElementKind::Struct(i) => Value::Struct(self.decode_struct(r, i, item)?),
        })
    }

    fn read_enum_raw(&self, r: &mut Cursor<&[u8]>, idx: usize) -> io::Result<i128> {
        let v = self.read_primitive(r, self.protocol.enum_underlying(idx))?;
        Ok(v.as_int().unwrap_or_default())
    }

    fn read_unsigned(&self, r: &mut Cursor<&[u8]>, prim: &PrimitiveType) -> io::Result<u64> {
        let v = self.read_primitive(r, prim)?;
        Ok(v.as_int().unwrap_or_default() as u64)
    }

    fn read_primitive(&self, r: &mut Cursor<&[u8]>, prim: &PrimitiveType) -> io::Result<Value> {
        match self.protocol.byte_order() {
            ByteOrder::Little => read_primitive::<LittleEndian>(r, prim),
            ByteOrder::Big => read_primitive::<BigEndian>(r, prim),
        }
    }

    // ---- encode ----

    /// `given` laid over the struct's defaults, nested structs included. Every enum member
    /// carries the declared raw value of its enumerator, so guards see what `serialize` sees.
    fn complete(&self, idx: usize, given: &Record, path: &str) -> Result<Record, CodecError> {
        let mut record = self.defaults(idx);
        for (name, value) in given.iter() {
            if record.get(name).is_none() {
                return Err(shape(&qualify(path, name), "not a member"));
            }
            record.set(name, value.clone());
        }
        for (f, rf) in self.protocol.fields(idx) {
            let field = qualify(path, &f.name);
            match &rf.kind {
                FieldKind::Enum(e) => self.canonical_member(&mut record, &f.name, *e, &field)?,
                FieldKind::Bitfield(plan) => {
                    for s in &plan.slices {
                        if let SliceRepr::Enum(e) = s.repr {
                            self.canonical_member(&mut record, &s.name, e, &qualify(path, &s.name))?;
                        }
                    }
                }
                FieldKind::Struct(s) => {
                    if let Some(Value::Struct(nested)) = record.get(&f.name) {
                        let nested = self.complete(*s, nested, &field)?;
                        record.set(f.name.as_str(), Value::Struct(nested));
                    }
                }
                FieldKind::Array { element, .. } => {
                    if let Some(Value::List(items)) = record.get(&f.name) {
                        let items = items
                            .iter()
                            .enumerate()
                            .map(|(i, item)| {
                                let item_field = format!("{}[{}]", field, i);
                                match (element, item) {
                                    (ElementKind::Enum(e), _) => self
                                        .enum_raw(*e, item, &item_field)
                                        .map(|raw| enum_value(self.protocol.enum_def(*e), raw)),
                                    (ElementKind::Struct(s), Value::Struct(nested)) => {
                                        self.complete(*s, nested, &item_field).map(Value::Struct)
                                    }
                                    _ => Ok(item.clone()),
                                }
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        record.set(f.name.as_str(), Value::List(items));
                    }
                }
                _ => {}
            }
        }
        Ok(record)
    }

    /// Rewrite an enum member to the enumerator its name declares.
    fn canonical_member(&self, record: &mut Record, name: &str, idx: usize, field: &str) -> Result<(), CodecError> {
        if let Some(v) = record.get(name) {
            let raw = self.enum_raw(idx, v, field)?;
            record.set(name, enum_value(self.protocol.enum_def(idx), raw));
        }
        Ok(())
    }

    fn encode_struct(&self, w: &mut Vec<u8>, idx: usize, given: &Record, path: &str) -> Result<(), CodecError> {
        let record = self.complete(idx, given, path)?;
        for (f, rf) in self.protocol.fields(idx) {
            let field = qualify(path, &f.name);
            if let Some(guard) = &rf.guard {
                if !self.guard_holds(guard, &record, &field)? {
                    continue;
                }
            }
            self.encode_field(w, f, &rf.kind, &record, &field)?;
        }
        Ok(())
    }

    fn encode_field(&self, w: &mut Vec<u8>, f: &FieldDef, kind: &FieldKind, record: &Record, field: &str) -> Result<(), CodecError> {
        let member = |name: &str| {
            record
                .get(name)
                .ok_or_else(|| shape(&qualify(field, name), "missing member"))
        };
        match kind {
            FieldKind::Padding { size } => w.extend(std::iter::repeat(0u8).take(*size)),
            FieldKind::Bitfield(plan) => {
                let values = plan
                    .slices
                    .iter()
                    .map(|s| self.slice_raw(s.repr, member(&s.name)?, &qualify(field, &s.name)))
                    .collect::<Result<Vec<u64>, CodecError>>()?;
                self.write_unsigned(w, plan, plan.pack(&values))?;
            }
            FieldKind::Primitive(prim) => self.write_primitive(w, prim, member(&f.name)?, field)?,
            FieldKind::Enum(i) => {
                let raw = self.enum_raw(*i, member(&f.name)?, field)?;
                self.write_raw(w, self.protocol.enum_underlying(*i), raw, field)?;
            }
            FieldKind::Struct(i) => {
                let nested = member(&f.name)?
                    .as_struct()
                    .ok_or_else(|| shape(field, "expected a struct value"))?;
                self.encode_struct(w, *i, nested, field)?;
            }
            FieldKind::Bytes { len } | FieldKind::String { len } => match member(&f.name)? {
                Value::Bytes(b) if b.len() <= *len => {
                    w.extend_from_slice(b);
                    w.extend(std::iter::repeat(0u8).take(len - b.len()));
                }
                Value::Bytes(b) => {
                    return Err(shape(field, format!("{} bytes do not fit in {}", b.len(), len)));
                }
                _ => return Err(shape(field, "expected bytes")),
            },
            FieldKind::Array { element, len } => {
                let items = member(&f.name)?
                    .as_list()
                    .ok_or_else(|| shape(field, "expected a list"))?;
                if items.len() != *len {
                    return Err(shape(field, format!("expected {} elements, got {}", len, items.len())));
                }
                for (i, item) in items.iter().enumerate() {
                    let item_field = format!("{}[{}]", field, i);
                    match element {
                        ElementKind::Primitive(prim) => self.write_primitive(w, prim, item, &item_field)?,
                        ElementKind::Enum(e) => {
                            let raw = self.enum_raw(*e, item, &item_field)?;
                            self.write_raw(w, self.protocol.enum_underlying(*e), raw, &item_field)?;
                        }
                        ElementKind::Struct(s) => {
                            let nested = item
                                .as_struct()
                                .ok_or_else(|| shape(&item_field, "expected a struct value"))?;
                            self.encode_struct(w, *s, nested, &item_field)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Declared raw value of an enum member, looked up by enumerator name.
    fn enum_raw(&self, idx: usize, v: &Value, field: &str) -> Result<i128, CodecError> {
        let e = self.protocol.enum_def(idx);
        let variant = v
            .variant()
            .ok_or_else(|| shape(field, format!("expected a {} value", e.name)))?;
        e.value_named(variant)
            .map(|ev| ev.value)
            .ok_or_else(|| shape(field, format!("'{}' is not a value of {}", variant, e.name)))
    }

    fn slice_raw(&self, repr: SliceRepr, v: &Value, field: &str) -> Result<u64, CodecError> {
        match repr {
            SliceRepr::Bool => match v {
                Value::Bool(b) => Ok(*b as u64),
                _ => Err(shape(field, "expected a bool")),
            },
            SliceRepr::Enum(i) => Ok(self.enum_raw(i, v, field)? as u64),
            SliceRepr::Unsigned(prim) => {
                let n = v.as_int().ok_or_else(|| shape(field, "expected an integer"))?;
                if !prim.contains(n) {
                    return Err(shape(field, format!("{} does not fit in {}", n, prim.name)));
                }
                Ok(n as u64)
            }
        }
    }

    fn write_unsigned(&self, w: &mut Vec<u8>, plan: &BitPlan, raw: u64) -> Result<(), CodecError> {
        self.write_raw(w, plan.storage, raw as i128, "")
    }

    fn write_primitive(&self, w: &mut Vec<u8>, prim: &PrimitiveType, v: &Value, field: &str) -> Result<(), CodecError> {
        if prim.class == NumericClass::Float {
            let x = v.as_f64().ok_or_else(|| shape(field, "expected a float"))?;
            match (self.protocol.byte_order(), prim.size) {
                (ByteOrder::Little, 4) => w.write_f32::<LittleEndian>(x as f32)?,
                (ByteOrder::Little, _) => w.write_f64::<LittleEndian>(x)?,
                (ByteOrder::Big, 4) => w.write_f32::<BigEndian>(x as f32)?,
                (ByteOrder::Big, _) => w.write_f64::<BigEndian>(x)?,
            }
            return Ok(());
        }
        let n = v.as_int().ok_or_else(|| shape(field, "expected an integer"))?;
        self.write_raw(w, prim, n, field)
    }

    fn write_raw(&self, w: &mut Vec<u8>, prim: &PrimitiveType, n: i128, field: &str) -> Result<(), CodecError> {
        let v = Value::from_int(prim, n)
            .ok_or_else(|| shape(field, format!("{} does not fit in {}", n, prim.name)))?;
        match self.protocol.byte_order() {
            ByteOrder::Little => write_int::<LittleEndian>(w, &v)?,
            ByteOrder::Big => write_int::<BigEndian>(w, &v)?,
        }
        Ok(())
    }
}

fn check_expected(field: &str, expected: i128, observed: i128) -> Result<(), CodecError> {
    if expected != observed {
        return Err(CodecError::OutOfRange {
            field: field.to_string(),
            expected,
            observed,
        });
    }
    Ok(())
}

fn read_primitive<B: Endian>(r: &mut Cursor<&[u8]>, prim: &PrimitiveType) -> io::Result<Value> {
    Ok(match prim.name {
        "u8" => Value::U8(r.read_u8()?),
        "u16" => Value::U16(r.read_u16::<B>()?),
        "u32" => Value::U32(r.read_u32::<B>()?),
        "u64" => Value::U64(r.read_u64::<B>()?),
        "i8" => Value::I8(r.read_i8()?),
        "i16" => Value::I16(r.read_i16::<B>()?),
        "i32" => Value::I32(r.read_i32::<B>()?),
        "i64" => Value::I64(r.read_i64::<B>()?),
        "f32" => Value::Float(r.read_f32::<B>()?),
        "f64" => Value::Double(r.read_f64::<B>()?),
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a primitive: {}", other),
            ))
        }
    })
}

fn write_int<B: Endian>(w: &mut Vec<u8>, v: &Value) -> io::Result<()> {
    match v {
        Value::U8(x) => w.write_u8(*x),
        Value::U16(x) => w.write_u16::<B>(*x),
        Value::U32(x) => w.write_u32::<B>(*x),
        Value::U64(x) => w.write_u64::<B>(*x),
        Value::I8(x) => w.write_i8(*x),
        Value::I16(x) => w.write_i16::<B>(*x),
        Value::I32(x) => w.write_i32::<B>(*x),
        Value::I64(x) => w.write_i64::<B>(*x),
        _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "not an integer")),
    }
}

/// Guard environment over the members decoded (or about to be encoded) so far.
struct RecordEnv<'a> {
    record: &'a Record,
    protocol: &'a ResolvedProtocol,
}

impl Env for RecordEnv<'_> {
    fn lookup(&self, name: &Name) -> Result<i128, EvalError> {
        match name {
            Name::Member(path) => {
                let v = self
                    .record
                    .lookup_path(path)
                    .ok_or_else(|| EvalError::UnknownName(name.to_string()))?;
                v.as_int().ok_or_else(|| EvalError::NotInteger(name.to_string()))
            }
            Name::Scoped { scope, item } => self
                .protocol
                .get_enum(scope)
                .and_then(|i| self.protocol.enum_def(i).value_named(item))
                .map(|v| v.value)
                .ok_or_else(|| EvalError::UnknownName(name.to_string())),
        }
    }
}
