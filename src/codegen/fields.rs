//! Per-kind member declarations and parse/serialize statements.
//!
//! Every read or write is checked and returns `bio::Status::OutOfRange()` on failure.
//! Nested structs propagate their own status. Conditional fields wrap both directions in
//! the guard; on parse a false guard resets the member to its default.

use super::enums::{from_raw_fn, to_raw_fn};
use super::{hex_literal, CodeWriter};
use crate::ast::{FieldDef, PrimitiveType};
use crate::bits::{BitPlan, SliceRepr};
use crate::resolve::{ElementKind, FieldKind, ResolvedField, ResolvedProtocol};

const FAIL: &str = "return bio::Status::OutOfRange();";

fn checked(call: String) -> String {
    format!("if (!{}) {}", call, FAIL)
}

fn propagated(call: String) -> String {
    format!("if (auto status = {}; !status) return status;", call)
}

fn element_type(p: &ResolvedProtocol, element: ElementKind) -> String {
    match element {
        ElementKind::Primitive(prim) => prim.cpp_type.to_string(),
        ElementKind::Enum(i) => p.enum_def(i).name.clone(),
        ElementKind::Struct(i) => p.struct_def(i).name.clone(),
    }
}

/// Default enumerator, or the one whose raw value is the expected constant.
fn enum_default(p: &ResolvedProtocol, idx: usize, expected: Option<i128>) -> String {
    let e = p.enum_def(idx);
    let value = match expected {
        Some(raw) => e.symbol_for(raw),
        None => e.fallback(),
    };
    format!("{}::{}", e.name, value.map(|v| v.name.as_str()).unwrap_or_default())
}

fn slice_type(p: &ResolvedProtocol, repr: SliceRepr) -> String {
    match repr {
        SliceRepr::Bool => "bool".to_string(),
        SliceRepr::Enum(i) => p.enum_def(i).name.clone(),
        SliceRepr::Unsigned(prim) => prim.cpp_type.to_string(),
    }
}

fn slice_default(p: &ResolvedProtocol, repr: SliceRepr) -> String {
    match repr {
        SliceRepr::Bool => "false".to_string(),
        SliceRepr::Enum(i) => enum_default(p, i, None),
        SliceRepr::Unsigned(_) => "0".to_string(),
    }
}

/// Member declarations with default initializers. Padding declares nothing.
pub(crate) fn declare(w: &mut CodeWriter, p: &ResolvedProtocol, f: &FieldDef, kind: &FieldKind) {
    let name = &f.name;
    let decl = match kind {
        FieldKind::Padding { .. } => return,
        FieldKind::Bitfield(plan) => {
            w.doc(&f.description);
            for (slice, def) in plan.slices.iter().zip(&f.bits) {
                let init = match slice.repr {
                    SliceRepr::Enum(_) => format!("{{{}}}", slice_default(p, slice.repr)),
                    _ => "{}".to_string(),
                };
                let line = format!("{} {}{};", slice_type(p, slice.repr), slice.name, init);
                if def.description.is_empty() {
                    w.line(line);
                } else {
                    w.line(format!("{}  // {}", line, def.description));
                }
            }
            return;
        }
        FieldKind::Primitive(prim) => match f.expected {
            Some(v) => format!("{} {}{{{}}};", prim.cpp_type, name, hex_literal(v)),
            None => format!("{} {}{{}};", prim.cpp_type, name),
        },
        FieldKind::Enum(i) => format!(
            "{} {}{{{}}};",
            p.enum_def(*i).name,
            name,
            enum_default(p, *i, f.expected)
        ),
        FieldKind::Struct(i) => format!("{} {}{{}};", p.struct_def(*i).name, name),
        FieldKind::Bytes { len } => format!("std::array<uint8_t, {}> {}{{}};", len, name),
        FieldKind::String { len } => format!("std::array<char, {}> {}{{}};", len, name),
        FieldKind::Array {
            element: ElementKind::Enum(i),
            len,
        } => {
            let ty = format!("std::array<{}, {}>", p.enum_def(*i).name, len);
            format!(
                "{ty} {name} = [] {{ {ty} a{{}}; a.fill({}); return a; }}();",
                enum_default(p, *i, None),
                ty = ty,
                name = name
            )
        }
        FieldKind::Array { element, len } => {
            format!("std::array<{}, {}> {}{{}};", element_type(p, *element), len, name)
        }
    };
    w.doc(&f.description);
    w.line(decl);
}

/// Statements that put a member back to its declared default.
fn reset(p: &ResolvedProtocol, f: &FieldDef, kind: &FieldKind) -> Vec<String> {
    let name = &f.name;
    match kind {
        FieldKind::Padding { .. } => Vec::new(),
        FieldKind::Bitfield(plan) => plan
            .slices
            .iter()
            .map(|s| format!("{} = {};", s.name, slice_default(p, s.repr)))
            .collect(),
        FieldKind::Primitive(_) => {
            let v = f.expected.map(hex_literal).unwrap_or_else(|| "0".to_string());
            vec![format!("{} = {};", name, v)]
        }
        FieldKind::Enum(i) => vec![format!("{} = {};", name, enum_default(p, *i, f.expected))],
        FieldKind::Struct(i) => vec![format!("{} = {}{{}};", name, p.struct_def(*i).name)],
        FieldKind::Bytes { .. } => vec![format!("{}.fill(0);", name)],
        FieldKind::String { .. } => vec![format!("{}.fill('\\0');", name)],
        FieldKind::Array { element, .. } => {
            let fill = match element {
                ElementKind::Primitive(_) => "0".to_string(),
                ElementKind::Enum(i) => enum_default(p, *i, None),
                ElementKind::Struct(i) => format!("{}{{}}", p.struct_def(*i).name),
            };
            vec![format!("{}.fill({});", name, fill)]
        }
    }
}

pub(crate) fn parse(w: &mut CodeWriter, p: &ResolvedProtocol, f: &FieldDef, rf: &ResolvedField) {
    match &f.condition {
        None => parse_body(w, p, f, &rf.kind),
        Some(cond) => {
            w.line(format!("if ({}) {{", cond.trim()));
            w.indent();
            parse_body(w, p, f, &rf.kind);
            w.dedent();
            let resets = reset(p, f, &rf.kind);
            if resets.is_empty() {
                w.line("}");
            } else {
                w.line("} else {");
                w.indent();
                for r in resets {
                    w.line(r);
                }
                w.dedent();
                w.line("}");
            }
        }
    }
}

pub(crate) fn serialize(w: &mut CodeWriter, p: &ResolvedProtocol, f: &FieldDef, rf: &ResolvedField) {
    match &f.condition {
        None => serialize_body(w, p, f, &rf.kind),
        Some(cond) => {
            w.line(format!("if ({}) {{", cond.trim()));
            w.indent();
            serialize_body(w, p, f, &rf.kind);
            w.dedent();
            w.line("}");
        }
    }
}

fn expected_check(w: &mut CodeWriter, f: &FieldDef, lhs: &str) {
    if let Some(v) = f.expected {
        let v = hex_literal(v);
        w.line(format!("if ({} != {}) {}  // {}: expected {}", lhs, v, FAIL, f.name, v));
    }
}

/// Read one enum value through its raw temporary.
fn parse_enum(w: &mut CodeWriter, p: &ResolvedProtocol, idx: usize, target: &str, tmp: &str, f: Option<&FieldDef>) {
    let raw = p.enum_underlying(idx);
    w.line(format!("{} {} = 0;", raw.cpp_type, tmp));
    w.line(checked(format!("reader.{}({})", raw.read_method(), tmp)));
    if let Some(f) = f {
        expected_check(w, f, tmp);
    }
    w.line(format!("{} = {}({});", target, from_raw_fn(&p.enum_def(idx).name), tmp));
}

fn parse_body(w: &mut CodeWriter, p: &ResolvedProtocol, f: &FieldDef, kind: &FieldKind) {
    let name = &f.name;
    match kind {
        FieldKind::Primitive(prim) => {
            w.line(checked(format!("reader.{}({})", prim.read_method(), name)));
            expected_check(w, f, name);
        }
        FieldKind::Enum(i) => {
            w.line("{");
            w.indent();
            parse_enum(w, p, *i, name, &format!("_{}_raw", name), Some(f));
            w.dedent();
            w.line("}");
        }
        FieldKind::Struct(_) => w.line(propagated(format!("{}.parse(reader)", name))),
        FieldKind::Bytes { len } | FieldKind::String { len } => {
            w.line(checked(format!("reader.read_bytes({}.data(), {})", name, len)));
        }
        FieldKind::Array { element, .. } => {
            w.line(format!("for (auto& elem : {}) {{", name));
            w.indent();
            match element {
                ElementKind::Primitive(prim) => {
                    w.line(checked(format!("reader.{}(elem)", prim.read_method())));
                }
                ElementKind::Enum(i) => parse_enum(w, p, *i, "elem", "_raw", None),
                ElementKind::Struct(_) => w.line(propagated("elem.parse(reader)".to_string())),
            }
            w.dedent();
            w.line("}");
        }
        FieldKind::Bitfield(plan) => {
            let tmp = format!("_{}_raw", name);
            w.line("{");
            w.indent();
            w.line(format!("{} {} = 0;", plan.storage.cpp_type, tmp));
            w.line(checked(format!("reader.{}({})", plan.storage.read_method(), tmp)));
            unpack(w, p, plan, &tmp);
            w.dedent();
            w.line("}");
        }
        FieldKind::Padding { size } => w.line(checked(format!("reader.skip({})", size))),
    }
}

fn unpack(w: &mut CodeWriter, p: &ResolvedProtocol, plan: &BitPlan, tmp: &str) {
    for s in &plan.slices {
        let bits = format!("(({} >> {}) & {})", tmp, s.offset, hex_literal(s.mask() as i128));
        let line = match s.repr {
            SliceRepr::Bool => format!("{} = {} != 0;", s.name, bits),
            SliceRepr::Unsigned(prim) => format!("{} = static_cast<{}>{};", s.name, prim.cpp_type, bits),
            SliceRepr::Enum(i) => format!(
                "{} = {}(static_cast<{}>{});",
                s.name,
                from_raw_fn(&p.enum_def(i).name),
                p.enum_underlying(i).cpp_type,
                bits
            ),
        };
        w.line(line);
    }
}

fn serialize_body(w: &mut CodeWriter, p: &ResolvedProtocol, f: &FieldDef, kind: &FieldKind) {
    let name = &f.name;
    match kind {
        FieldKind::Primitive(prim) => {
            w.line(checked(format!("writer.{}({})", prim.write_method(), name)));
        }
        FieldKind::Enum(i) => w.line(checked(write_enum(p, *i, name))),
        FieldKind::Struct(_) => w.line(propagated(format!("{}.serialize(writer)", name))),
        FieldKind::Bytes { len } | FieldKind::String { len } => {
            w.line(checked(format!("writer.write_bytes({}.data(), {})", name, len)));
        }
        FieldKind::Array { element, .. } => {
            w.line(format!("for (const auto& elem : {}) {{", name));
            w.indent();
            match element {
                ElementKind::Primitive(prim) => {
                    w.line(checked(format!("writer.{}(elem)", prim.write_method())));
                }
                ElementKind::Enum(i) => w.line(checked(write_enum(p, *i, "elem"))),
                ElementKind::Struct(_) => w.line(propagated("elem.serialize(writer)".to_string())),
            }
            w.dedent();
            w.line("}");
        }
        FieldKind::Bitfield(plan) => {
            let tmp = format!("_{}_raw", name);
            w.line("{");
            w.indent();
            w.line(format!("{} {} = 0;", plan.storage.cpp_type, tmp));
            pack(w, p, plan, &tmp);
            w.line(checked(format!("writer.{}({})", plan.storage.write_method(), tmp)));
            w.dedent();
            w.line("}");
        }
        FieldKind::Padding { size } => {
            let fill = format!("_{}_fill", name);
            w.line("{");
            w.indent();
            w.line(format!("constexpr std::array<uint8_t, {}> {}{{}};", size, fill));
            w.line(checked(format!("writer.write_bytes({}.data(), {})", fill, size)));
            w.dedent();
            w.line("}");
        }
    }
}

fn write_enum(p: &ResolvedProtocol, idx: usize, value: &str) -> String {
    let e = p.enum_def(idx);
    format!(
        "writer.{}({}({}))",
        p.enum_underlying(idx).write_method(),
        to_raw_fn(&e.name),
        value
    )
}

fn pack(w: &mut CodeWriter, p: &ResolvedProtocol, plan: &BitPlan, tmp: &str) {
    let storage: &PrimitiveType = plan.storage;
    for s in &plan.slices {
        let value = match s.repr {
            SliceRepr::Bool => format!("{} ? 1 : 0", s.name),
            SliceRepr::Unsigned(_) => s.name.clone(),
            SliceRepr::Enum(i) => format!("{}({})", to_raw_fn(&p.enum_def(i).name), s.name),
        };
        w.line(format!(
            "{tmp} = static_cast<{ty}>({tmp} | ((static_cast<{ty}>({value}) & {mask}) << {offset}));",
            tmp = tmp,
            ty = storage.cpp_type,
            value = value,
            mask = hex_literal(s.mask() as i128),
            offset = s.offset
        ));
    }
}
