//! C++17 header generation for a resolved protocol.
//!
//! One unit becomes one header: provenance comment, include guard, includes, the
//! byte-order reader/writer aliases, then every enum and every struct inside the unit's
//! namespace. Output depends only on the resolved model and the [`GeneratorConfig`].

mod enums;
mod fields;
mod structs;

use crate::resolve::ResolvedProtocol;
use tracing::debug;

/// Settings that shape generated text but not its semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Include path of the binary-io helper header.
    pub helper_include: String,
    /// Spaces per indentation level.
    pub indent: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            helper_include: "binary-io/binary-io.hpp".to_string(),
            indent: 2,
        }
    }
}

/// One generated header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,
}

/// Header file name for a protocol, e.g. `sensor_protocol.hpp`.
pub fn artifact_name(protocol: &str) -> String {
    format!("{}_protocol.hpp", protocol.to_lowercase())
}

/// Include guard macro for a protocol, e.g. `SENSOR_PROTOCOL_HPP_`.
pub fn guard_name(protocol: &str) -> String {
    format!("{}_PROTOCOL_HPP_", protocol.to_uppercase())
}

/// C++ integer literal in hex. A negative literal stays signed: its magnitude is spelled
/// with an `LL` suffix once it no longer fits `int`, and the two type minimums, which have
/// no literal spelling, are built from the maximum.
pub fn hex_literal(value: i128) -> String {
    if value >= 0 {
        return format!("0x{:X}", value);
    }
    let magnitude = -value;
    if magnitude <= i32::MAX as i128 {
        format!("-0x{:X}", magnitude)
    } else if magnitude == 1 << 31 {
        "(-0x7FFFFFFF - 1)".to_string()
    } else if magnitude == 1 << 63 {
        "(-0x7FFFFFFFFFFFFFFF - 1)".to_string()
    } else {
        format!("-0x{:X}LL", magnitude)
    }
}

/// Line-oriented text sink with an indentation level.
pub(crate) struct CodeWriter {
    out: String,
    unit: String,
    level: usize,
}

impl CodeWriter {
    pub(crate) fn new(indent: usize) -> Self {
        CodeWriter {
            out: String::new(),
            unit: " ".repeat(indent),
            level: 0,
        }
    }

    pub(crate) fn line(&mut self, content: impl AsRef<str>) {
        let content = content.as_ref();
        if !content.is_empty() {
            for _ in 0..self.level {
                self.out.push_str(&self.unit);
            }
            self.out.push_str(content);
        }
        self.out.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.out.push('\n');
    }

    pub(crate) fn indent(&mut self) {
        self.level += 1;
    }

    pub(crate) fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// `/// text` lines for a non-empty description.
    pub(crate) fn doc(&mut self, description: &str) {
        for l in description.lines().map(str::trim_end) {
            if l.is_empty() {
                self.line("///");
            } else {
                self.line(format!("/// {}", l));
            }
        }
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}

/// Assemble the header for `protocol`. `source_name` appears in the provenance comment.
pub fn generate(protocol: &ResolvedProtocol, source_name: &str, config: &GeneratorConfig) -> Artifact {
    let name = protocol.name();
    let guard = guard_name(name);
    let order = protocol.byte_order();
    let mut w = CodeWriter::new(config.indent);

    w.line(format!("// Generated by biogen from {}. Do not edit.", source_name));
    w.line(format!("#ifndef {}", guard));
    w.line(format!("#define {}", guard));
    w.blank();
    for std_header in ["<array>", "<cstddef>", "<cstdint>"] {
        w.line(format!("#include {}", std_header));
    }
    w.blank();
    w.line(format!("#include \"{}\"", config.helper_include));
    if !protocol.protocol.includes.is_empty() {
        w.blank();
        for extra in &protocol.protocol.includes {
            if extra.starts_with('<') {
                w.line(format!("#include {}", extra));
            } else {
                w.line(format!("#include \"{}\"", extra));
            }
        }
    }
    w.blank();
    w.line("namespace bio {");
    w.line(format!("using {} = ByteReaderT<{}>;", order.reader_alias(), order.codec()));
    w.line(format!("using {} = ByteWriterT<{}>;", order.writer_alias(), order.codec()));
    w.line("}  // namespace bio");
    w.blank();

    let namespace = protocol.protocol.namespace.as_str();
    if !namespace.is_empty() {
        w.line(format!("namespace {} {{", namespace));
        w.blank();
    }
    if !protocol.protocol.description.is_empty() {
        w.doc(&protocol.protocol.description);
        w.blank();
    }
    for i in 0..protocol.protocol.enums.len() {
        enums::emit(&mut w, protocol, i);
        w.blank();
    }
    for &i in protocol.emission_order() {
        structs::emit(&mut w, protocol, i);
        w.blank();
    }
    if !namespace.is_empty() {
        w.line(format!("}}  // namespace {}", namespace));
        w.blank();
    }
    w.line(format!("#endif  // {}", guard));

    debug!(
        protocol = %name,
        enums = protocol.protocol.enums.len(),
        structs = protocol.protocol.structs.len(),
        "generated header"
    );
    Artifact {
        file_name: artifact_name(name),
        contents: w.finish(),
    }
}
