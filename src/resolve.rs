//! Symbol resolution: name tables, field kinds, bit plans, guard checks, struct order.
//!
//! Resolution runs after the whole unit is loaded, so a struct may refer to a struct
//! declared later in the same unit. Each field's declared type string is classified in a
//! fixed priority order: reserved markers (`padding`, `bitfield_*`, `bytes`, `string`,
//! `array`), then the unit's enums, then its structs, then the primitive registry.

use crate::ast::*;
use crate::bits::{self, BitPlan};
use crate::error::{CompileError, CompileErrorKind};
use crate::expr::{self, Expr, Name};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Closed classification of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Primitive(&'static PrimitiveType),
    /// Index into `protocol.enums`.
    Enum(usize),
    /// Index into `protocol.structs`.
    Struct(usize),
    Bytes { len: usize },
    String { len: usize },
    Array { element: ElementKind, len: usize },
    Bitfield(BitPlan),
    Padding { size: usize },
}

/// What an array may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Primitive(&'static PrimitiveType),
    Enum(usize),
    Struct(usize),
}

impl FieldKind {
    pub fn is_padding(&self) -> bool {
        matches!(self, FieldKind::Padding { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub kind: FieldKind,
    /// Parsed `condition`, if the field has one.
    pub guard: Option<Expr>,
}

/// A protocol with its symbol tables and every field classified.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProtocol {
    pub protocol: ProtocolDef,
    pub enums_by_name: HashMap<String, usize>,
    pub structs_by_name: HashMap<String, usize>,
    enum_underlying: Vec<&'static PrimitiveType>,
    fields: Vec<Vec<ResolvedField>>,
    order: Vec<usize>,
}

const RESERVED: [&str; 4] = ["padding", "bytes", "string", "array"];

impl ResolvedProtocol {
    pub fn resolve(protocol: ProtocolDef) -> Result<Self, CompileError> {
        let unit = protocol.name.clone();
        let err = |entity: &str, field: Option<&str>, kind| CompileError::new(&unit, entity, field, kind);

        let mut enums_by_name = HashMap::new();
        let mut enum_underlying = Vec::with_capacity(protocol.enums.len());
        for (i, e) in protocol.enums.iter().enumerate() {
            if enums_by_name.insert(e.name.clone(), i).is_some() {
                return Err(err(&e.name, None, duplicate("enum", &e.name)));
            }
            enum_underlying.push(check_enum(e).map_err(|k| err(&e.name, None, k))?);
        }
        let mut structs_by_name = HashMap::new();
        for (i, s) in protocol.structs.iter().enumerate() {
            if enums_by_name.contains_key(&s.name) {
                return Err(err(&s.name, None, duplicate("type name", &s.name)));
            }
            if structs_by_name.insert(s.name.clone(), i).is_some() {
                return Err(err(&s.name, None, duplicate("struct", &s.name)));
            }
        }

        let mut resolved = ResolvedProtocol {
            protocol,
            enums_by_name,
            structs_by_name,
            enum_underlying,
            fields: Vec::new(),
            order: Vec::new(),
        };

        // Pass 1: kinds for every field of every struct.
        let mut fields = Vec::with_capacity(resolved.protocol.structs.len());
        for s in &resolved.protocol.structs {
            if s.fields.is_empty() {
                return Err(err(
                    &s.name,
                    None,
                    CompileErrorKind::Inconsistent("a struct needs at least one field".to_string()),
                ));
            }
            let mut kinds = Vec::with_capacity(s.fields.len());
            for f in &s.fields {
                let kind = resolved
                    .classify(f)
                    .map_err(|k| err(&s.name, Some(&f.name), k))?;
                kinds.push(kind);
            }
            fields.push(kinds);
        }

        // Pass 2: member uniqueness and guards, which need every struct's kinds.
        let mut guarded = Vec::with_capacity(fields.len());
        for (si, kinds) in fields.iter().enumerate() {
            let s = &resolved.protocol.structs[si];
            let members = members_of(&s.fields, kinds);
            let mut seen = HashSet::new();
            for m in &members {
                if !seen.insert(m.name) {
                    return Err(err(&s.name, Some(m.name), duplicate("member", m.name)));
                }
            }
            let mut out = Vec::with_capacity(kinds.len());
            for (pos, (f, kind)) in s.fields.iter().zip(kinds).enumerate() {
                let guard = match &f.condition {
                    None => None,
                    Some(text) => {
                        let expr = expr::parse(text).map_err(|m| {
                            err(&s.name, Some(&f.name), CompileErrorKind::Inconsistent(m))
                        })?;
                        resolved
                            .check_guard(&fields, si, pos, &expr)
                            .map_err(|k| err(&s.name, Some(&f.name), k))?;
                        Some(expr)
                    }
                };
                out.push(ResolvedField {
                    kind: kind.clone(),
                    guard,
                });
            }
            guarded.push(out);
        }
        resolved.fields = guarded;

        // Pass 3: containment order, which also rejects by-value cycles.
        resolved.order = resolved.containment_order().map_err(|path| {
            let entity = path.first().cloned().unwrap_or_default();
            err(&entity, None, CompileErrorKind::Cycle(path))
        })?;

        debug!(
            protocol = %resolved.protocol.name,
            enums = resolved.protocol.enums.len(),
            structs = resolved.protocol.structs.len(),
            "resolved protocol"
        );
        Ok(resolved)
    }

    fn classify(&self, f: &FieldDef) -> Result<FieldKind, CompileErrorKind> {
        let t = f.type_name.as_str();
        let bitfield_storage = PrimitiveType::bitfield_storage(t);
        if bitfield_storage.is_none() && !f.bits.is_empty() {
            return Err(CompileErrorKind::Inconsistent(format!(
                "bit slices are only allowed on bitfield types, not '{}'",
                t
            )));
        }
        let kind = if t == "padding" {
            FieldKind::Padding {
                size: required(f.pad_size, "padding needs pad_size")?,
            }
        } else if let Some(storage) = bitfield_storage {
            let plan = bits::plan(storage, &f.bits, &self.protocol.enums, |n| {
                self.enums_by_name.get(n).copied()
            })?;
            FieldKind::Bitfield(plan)
        } else if t == "bytes" {
            FieldKind::Bytes {
                len: required(f.length, "bytes needs a length")?,
            }
        } else if t == "string" {
            FieldKind::String {
                len: required(f.length, "string needs a length")?,
            }
        } else if t == "array" {
            let element_type = f.element_type.as_deref().ok_or_else(|| {
                CompileErrorKind::Inconsistent("array needs an element_type".to_string())
            })?;
            FieldKind::Array {
                element: self.classify_element(element_type)?,
                len: required(f.length, "array needs a length")?,
            }
        } else if let Some(&i) = self.enums_by_name.get(t) {
            FieldKind::Enum(i)
        } else if let Some(&i) = self.structs_by_name.get(t) {
            FieldKind::Struct(i)
        } else if let Some(p) = PrimitiveType::lookup(t) {
            FieldKind::Primitive(p)
        } else {
            return Err(CompileErrorKind::UnresolvedSymbol(t.to_string()));
        };
        if let Some(expected) = f.expected {
            self.check_expected(&kind, expected)?;
        }
        Ok(kind)
    }

    fn classify_element(&self, t: &str) -> Result<ElementKind, CompileErrorKind> {
        if RESERVED.contains(&t) || PrimitiveType::bitfield_storage(t).is_some() {
            return Err(CompileErrorKind::Inconsistent(format!(
                "array elements must be primitives, enums or structs, not '{}'",
                t
            )));
        }
        if let Some(&i) = self.enums_by_name.get(t) {
            Ok(ElementKind::Enum(i))
        } else if let Some(&i) = self.structs_by_name.get(t) {
            Ok(ElementKind::Struct(i))
        } else if let Some(p) = PrimitiveType::lookup(t) {
            Ok(ElementKind::Primitive(p))
        } else {
            Err(CompileErrorKind::UnresolvedSymbol(t.to_string()))
        }
    }

    fn check_expected(&self, kind: &FieldKind, expected: i128) -> Result<(), CompileErrorKind> {
        let storage = match kind {
            FieldKind::Primitive(p) if p.is_integer() => *p,
            FieldKind::Enum(i) => self.enum_underlying[*i],
            _ => {
                return Err(CompileErrorKind::Inconsistent(
                    "expected values apply only to integer and enum fields".to_string(),
                ))
            }
        };
        if !storage.contains(expected) {
            return Err(CompileErrorKind::Inconsistent(format!(
                "expected value {} does not fit in {}",
                expected, storage.name
            )));
        }
        if let FieldKind::Enum(i) = kind {
            let e = &self.protocol.enums[*i];
            if !e.values.iter().any(|v| v.value == expected) {
                return Err(CompileErrorKind::Inconsistent(format!(
                    "expected value {} is not a declared value of {}",
                    expected, e.name
                )));
            }
        }
        Ok(())
    }

    fn check_guard(
        &self,
        kinds: &[Vec<FieldKind>],
        struct_idx: usize,
        pos: usize,
        expr: &Expr,
    ) -> Result<(), CompileErrorKind> {
        let s = &self.protocol.structs[struct_idx];
        let earlier = members_of(&s.fields[..pos], &kinds[struct_idx][..pos]);
        for name in expr.names() {
            match name {
                Name::Scoped { scope, item } => {
                    let known = self
                        .enums_by_name
                        .get(scope)
                        .map(|&i| self.protocol.enums[i].value_named(item).is_some())
                        .unwrap_or(false);
                    if !known {
                        return Err(CompileErrorKind::Inconsistent(format!(
                            "condition refers to unknown enum value '{}'",
                            name
                        )));
                    }
                }
                Name::Member(path) => {
                    let root = &path[0];
                    let mut current = match earlier.iter().find(|m| m.name == root) {
                        Some(m) => m.nested,
                        None => {
                            let later = members_of(&s.fields, &kinds[struct_idx]).iter().any(|m| m.name == root);
                            let why = if later { "is not parsed before this field" } else { "is not a member" };
                            return Err(CompileErrorKind::Inconsistent(format!(
                                "condition refers to '{}', which {}",
                                root, why
                            )));
                        }
                    };
                    for segment in &path[1..] {
                        let nested = current.ok_or_else(|| {
                            CompileErrorKind::Inconsistent(format!(
                                "condition path '{}' goes through a non-struct member",
                                name
                            ))
                        })?;
                        let inner = &self.protocol.structs[nested];
                        let found = members_of(&inner.fields, &kinds[nested])
                            .into_iter()
                            .find(|m| m.name == segment)
                            .ok_or_else(|| {
                                CompileErrorKind::Inconsistent(format!(
                                    "condition path '{}': '{}' has no member '{}'",
                                    name, inner.name, segment
                                ))
                            })?;
                        current = found.nested;
                    }
                }
            }
        }
        Ok(())
    }

    /// Struct indices with every struct after the structs it holds by value. Declaration
    /// order is kept wherever dependencies allow. On a cycle, returns the names along it.
    fn containment_order(&self) -> Result<Vec<usize>, Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }
        fn visit(
            this: &ResolvedProtocol,
            i: usize,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
            order: &mut Vec<usize>,
        ) -> Result<(), Vec<String>> {
            match marks[i] {
                Mark::Done => return Ok(()),
                Mark::Active => {
                    let start = stack.iter().position(|&s| s == i).unwrap_or(0);
                    let mut path: Vec<String> = stack[start..]
                        .iter()
                        .map(|&s| this.protocol.structs[s].name.clone())
                        .collect();
                    path.push(this.protocol.structs[i].name.clone());
                    return Err(path);
                }
                Mark::New => {}
            }
            marks[i] = Mark::Active;
            stack.push(i);
            for f in &this.fields[i] {
                let dep = match &f.kind {
                    FieldKind::Struct(d) => Some(*d),
                    FieldKind::Array {
                        element: ElementKind::Struct(d),
                        ..
                    } => Some(*d),
                    _ => None,
                };
                if let Some(d) = dep {
                    visit(this, d, marks, stack, order)?;
                }
            }
            stack.pop();
            marks[i] = Mark::Done;
            order.push(i);
            Ok(())
        }

        let n = self.protocol.structs.len();
        let mut marks = vec![Mark::New; n];
        let mut stack = Vec::new();
        let mut order = Vec::with_capacity(n);
        for i in 0..n {
            visit(self, i, &mut marks, &mut stack, &mut order)?;
        }
        Ok(order)
    }

    pub fn name(&self) -> &str {
        &self.protocol.name
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.protocol.byte_order
    }

    pub fn get_struct(&self, name: &str) -> Option<usize> {
        self.structs_by_name.get(name).copied()
    }

    pub fn get_enum(&self, name: &str) -> Option<usize> {
        self.enums_by_name.get(name).copied()
    }

    pub fn enum_def(&self, i: usize) -> &EnumDef {
        &self.protocol.enums[i]
    }

    /// Underlying primitive of enum `i`.
    pub fn enum_underlying(&self, i: usize) -> &'static PrimitiveType {
        self.enum_underlying[i]
    }

    pub fn struct_def(&self, i: usize) -> &StructDef {
        &self.protocol.structs[i]
    }

    /// Declared fields of struct `i` paired with their resolution.
    pub fn fields(&self, i: usize) -> impl Iterator<Item = (&FieldDef, &ResolvedField)> {
        self.protocol.structs[i].fields.iter().zip(&self.fields[i])
    }

    /// Order in which structs are emitted.
    pub fn emission_order(&self) -> &[usize] {
        &self.order
    }
}

struct Member<'a> {
    name: &'a str,
    /// Struct index when the member is itself a struct.
    nested: Option<usize>,
}

/// Members a run of fields declares: every non-padding field, with bitfields contributing
/// their slices instead of themselves.
fn members_of<'a>(fields: &'a [FieldDef], kinds: &'a [FieldKind]) -> Vec<Member<'a>> {
    let mut out = Vec::new();
    for (f, kind) in fields.iter().zip(kinds) {
        match kind {
            FieldKind::Padding { .. } => {}
            FieldKind::Bitfield(plan) => out.extend(plan.slices.iter().map(|s| Member {
                name: s.name.as_str(),
                nested: None,
            })),
            FieldKind::Struct(i) => out.push(Member {
                name: f.name.as_str(),
                nested: Some(*i),
            }),
            _ => out.push(Member {
                name: f.name.as_str(),
                nested: None,
            }),
        }
    }
    out
}

fn check_enum(e: &EnumDef) -> Result<&'static PrimitiveType, CompileErrorKind> {
    let underlying = PrimitiveType::lookup(&e.underlying)
        .filter(|p| p.is_integer())
        .ok_or_else(|| {
            CompileErrorKind::Inconsistent(format!(
                "enum underlying type must be an integer primitive, not '{}'",
                e.underlying
            ))
        })?;
    if e.values.is_empty() {
        return Err(CompileErrorKind::Inconsistent(
            "an enum needs at least one value".to_string(),
        ));
    }
    for (i, v) in e.values.iter().enumerate() {
        if e.values[..i].iter().any(|prev| prev.name == v.name) {
            return Err(duplicate("enum value", &v.name));
        }
        if !underlying.contains(v.value) {
            return Err(CompileErrorKind::Inconsistent(format!(
                "value {} = {} does not fit in {}",
                v.name, v.value, underlying.name
            )));
        }
    }
    Ok(underlying)
}

fn duplicate(what: &'static str, name: &str) -> CompileErrorKind {
    CompileErrorKind::Duplicate {
        what,
        name: name.to_string(),
    }
}

fn required(v: Option<u64>, message: &str) -> Result<usize, CompileErrorKind> {
    match v {
        Some(n) if n > 0 => Ok(n as usize),
        _ => Err(CompileErrorKind::Inconsistent(message.to_string())),
    }
}
