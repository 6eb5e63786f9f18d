//! Format decoded records for display.

use crate::resolve::{FieldKind, ResolvedProtocol};
use crate::value::{Record, Value};

/// Raw scalar string.
pub fn format_scalar_raw(v: &Value) -> String {
    match v {
        Value::U8(x) => format!("{}", x),
        Value::U16(x) => format!("{}", x),
        Value::U32(x) => format!("{}", x),
        Value::U64(x) => format!("{}", x),
        Value::I8(x) => format!("{}", x),
        Value::I16(x) => format!("{}", x),
        Value::I32(x) => format!("{}", x),
        Value::I64(x) => format!("{}", x),
        Value::Bool(x) => format!("{}", x),
        Value::Float(x) => format!("{}", x),
        Value::Double(x) => format!("{}", x),
        Value::Enum { variant, raw } => format!("{} ({})", variant, raw),
        _ => format!("{:?}", v),
    }
}

pub fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// Fixed-capacity string contents up to the first NUL, with non-printable bytes escaped.
pub fn text_string(b: &[u8]) -> String {
    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
    let text: String = b[..end].iter().flat_map(|&c| std::ascii::escape_default(c)).map(char::from).collect();
    format!("\"{}\"", text)
}

/// Multi-line rendering of a decoded instance of struct `idx`.
pub fn record_to_dump(protocol: &ResolvedProtocol, idx: usize, record: &Record) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{} {{", protocol.struct_def(idx).name));
    push_members(protocol, idx, record, 1, &mut lines);
    lines.push("}".to_string());
    lines.join("\n")
}

fn push_members(protocol: &ResolvedProtocol, idx: usize, record: &Record, depth: usize, lines: &mut Vec<String>) {
    let pad = "  ".repeat(depth);
    for (f, rf) in protocol.fields(idx) {
        match &rf.kind {
            FieldKind::Padding { size } => lines.push(format!("{}<{} padding bytes>", pad, size)),
            FieldKind::Bitfield(plan) => {
                for s in &plan.slices {
                    if let Some(v) = record.get(&s.name) {
                        lines.push(format!("{}{}: {}", pad, s.name, format_scalar_raw(v)));
                    }
                }
            }
            kind => {
                if let Some(v) = record.get(&f.name) {
                    push_value(protocol, kind, &f.name, v, depth, lines);
                }
            }
        }
    }
}

fn push_value(protocol: &ResolvedProtocol, kind: &FieldKind, label: &str, v: &Value, depth: usize, lines: &mut Vec<String>) {
    let pad = "  ".repeat(depth);
    match (kind, v) {
        (FieldKind::String { .. }, Value::Bytes(b)) => lines.push(format!("{}{}: {}", pad, label, text_string(b))),
        (_, Value::Bytes(b)) => lines.push(format!("{}{}: hex({})", pad, label, hex_string(b))),
        (FieldKind::Struct(i), Value::Struct(r)) => {
            lines.push(format!("{}{}: {} {{", pad, label, protocol.struct_def(*i).name));
            push_members(protocol, *i, r, depth + 1, lines);
            lines.push(format!("{}}}", pad));
        }
        (FieldKind::Array { element, .. }, Value::List(items)) => {
            lines.push(format!("{}{}: [", pad, label));
            let inner = "  ".repeat(depth + 1);
            for (i, item) in items.iter().enumerate() {
                match (element, item) {
                    (crate::resolve::ElementKind::Struct(s), Value::Struct(r)) => {
                        lines.push(format!("{}[{}] {} {{", inner, i, protocol.struct_def(*s).name));
                        push_members(protocol, *s, r, depth + 2, lines);
                        lines.push(format!("{}}}", inner));
                    }
                    _ => lines.push(format!("{}[{}] {}", inner, i, format_scalar_raw(item))),
                }
            }
            lines.push(format!("{}]", pad));
        }
        _ => lines.push(format!("{}{}: {}", pad, label, format_scalar_raw(v))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_and_bytes() {
        assert_eq!(format_scalar_raw(&Value::I16(-3)), "-3");
        assert_eq!(
            format_scalar_raw(&Value::Enum { variant: "Green".into(), raw: 1 }),
            "Green (1)"
        );
        assert_eq!(hex_string(&[0xde, 0xad, 0x01]), "de ad 01");
        assert_eq!(text_string(b"hi\n\0\0junk"), "\"hi\\n\"");
    }
}
