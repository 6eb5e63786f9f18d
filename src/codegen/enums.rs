//! Enum blocks: the scoped enum plus its total raw converters.

use super::{hex_literal, CodeWriter};
use crate::resolve::ResolvedProtocol;
use std::collections::HashSet;

/// `ColorFromRaw`: maps any raw value to a declared enumerator.
pub(crate) fn from_raw_fn(enum_name: &str) -> String {
    format!("{}FromRaw", enum_name)
}

/// `ColorToRaw`: the declared numeric value.
pub(crate) fn to_raw_fn(enum_name: &str) -> String {
    format!("{}ToRaw", enum_name)
}

pub(crate) fn emit(w: &mut CodeWriter, protocol: &ResolvedProtocol, idx: usize) {
    let e = protocol.enum_def(idx);
    let raw = protocol.enum_underlying(idx).cpp_type;

    w.doc(&e.description);
    w.line(format!("enum class {} : {} {{", e.name, raw));
    w.indent();
    for v in &e.values {
        if v.description.is_empty() {
            w.line(format!("{} = {},", v.name, hex_literal(v.value)));
        } else {
            w.line(format!("{} = {},  // {}", v.name, hex_literal(v.value), v.description));
        }
    }
    w.dedent();
    w.line("};");
    w.blank();

    // Two enumerators may share a raw value; the first one declared owns the case label.
    let fallback = &e.values[0].name;
    w.line(format!("inline {} {}({} raw) {{", e.name, from_raw_fn(&e.name), raw));
    w.indent();
    w.line("switch (raw) {");
    w.indent();
    let mut seen = HashSet::new();
    for v in &e.values {
        if seen.insert(v.value) {
            w.line(format!("case {}: return {}::{};", hex_literal(v.value), e.name, v.name));
        }
    }
    w.line(format!("default: return {}::{};", e.name, fallback));
    w.dedent();
    w.line("}");
    w.dedent();
    w.line("}");
    w.blank();

    w.line(format!("inline {} {}({} value) {{", raw, to_raw_fn(&e.name), e.name));
    w.indent();
    w.line(format!("return static_cast<{}>(value);", raw));
    w.dedent();
    w.line("}");
}
